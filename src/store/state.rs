// src/store/state.rs

//! Synchronous store state shared by the reference store implementations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ConvoyError, Result};
use crate::store::{DepEdge, EventKind, ItemFilter, NewItem, StoreEvent, WorkItem};
use crate::types::{ItemStatus, ItemType};

/// Items, edges and the event log of one store.
///
/// This is also the on-disk format of [`crate::store::FileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    /// Id prefix for generated ids, e.g. `"hq-"`.
    pub prefix: String,
    #[serde(default)]
    pub next_seq: u64,
    #[serde(default)]
    pub items: BTreeMap<String, WorkItem>,
    #[serde(default)]
    pub deps: Vec<DepEdge>,
    #[serde(default)]
    pub events: Vec<StoreEvent>,
}

impl StoreState {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<WorkItem> {
        self.items.get(id).cloned()
    }

    pub fn create(&mut self, new: NewItem) -> Result<WorkItem> {
        let id = match new.id {
            Some(id) => id,
            None => self.generate_id(&new.item_type),
        };

        if self.items.contains_key(&id) {
            return Err(ConvoyError::InvalidInput(format!(
                "work item {id} already exists"
            )));
        }

        let item = WorkItem {
            id: id.clone(),
            title: new.title,
            item_type: new.item_type,
            status: new.status,
            assignee: new.assignee,
            integration_point: new.integration_point,
        };
        self.items.insert(id.clone(), item.clone());
        self.push_event(EventKind::Created, &id, Some(item.status.as_str().to_string()));
        Ok(item)
    }

    pub fn set_status(&mut self, id: &str, status: ItemStatus) -> Result<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| ConvoyError::ItemNotFound(id.to_string()))?;

        if item.status == status {
            return Ok(());
        }
        item.status = status;

        let kind = if status.is_closed() {
            EventKind::Closed
        } else {
            EventKind::StatusChanged
        };
        self.push_event(kind, id, Some(status.as_str().to_string()));
        Ok(())
    }

    pub fn set_assignee(&mut self, id: &str, assignee: Option<String>) -> Result<()> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| ConvoyError::ItemNotFound(id.to_string()))?;
        item.assignee = assignee;
        self.push_event(EventKind::Updated, id, None);
        Ok(())
    }

    pub fn add_dependency(&mut self, edge: DepEdge) -> Result<()> {
        if !self.items.contains_key(&edge.source) {
            return Err(ConvoyError::ItemNotFound(edge.source.clone()));
        }
        if self.deps.contains(&edge) {
            return Ok(());
        }
        let source = edge.source.clone();
        let value = format!("{}:{}", edge.dep_type, edge.target);
        self.deps.push(edge);
        self.push_event(EventKind::DependencyAdded, &source, Some(value));
        Ok(())
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<DepEdge> {
        self.deps.iter().filter(|e| e.source == id).cloned().collect()
    }

    pub fn dependents_of(&self, id: &str) -> Vec<DepEdge> {
        self.deps.iter().filter(|e| e.target == id).cloned().collect()
    }

    pub fn list(&self, filter: &ItemFilter) -> Vec<WorkItem> {
        self.items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub fn events_since(&self, after: u64) -> Vec<StoreEvent> {
        self.events
            .iter()
            .filter(|e| e.ordinal > after)
            .cloned()
            .collect()
    }

    /// Append an event and return its ordinal.
    pub fn push_event(&mut self, kind: EventKind, item_id: &str, new_value: Option<String>) -> u64 {
        let ordinal = self.events.last().map(|e| e.ordinal).unwrap_or(0) + 1;
        self.events.push(StoreEvent {
            ordinal,
            kind,
            item_id: item_id.to_string(),
            new_value,
        });
        ordinal
    }

    fn generate_id(&mut self, item_type: &ItemType) -> String {
        loop {
            self.next_seq += 1;
            let id = match item_type {
                ItemType::Convoy => format!("{}cv-{}", self.prefix, self.next_seq),
                _ => format!("{}{}", self.prefix, self.next_seq),
            };
            if !self.items.contains_key(&id) {
                return id;
            }
        }
    }
}
