// src/store/mod.rs

//! Work-item store collaborator.
//!
//! The scheduling core never owns storage. It talks to stores through two
//! narrow, object-safe traits:
//!
//! - [`WorkStore`]: read/create/update items, add/list typed edges.
//! - [`EventLog`]: fetch the store's append-only event stream after a given
//!   ordinal.
//!
//! A [`BackingStore`] is anything that provides both. Two reference
//! implementations ship with the crate: [`MemoryStore`] (tests, embedding)
//! and [`FileStore`] (a JSON snapshot on disk, used by the CLI). The routed
//! [`StoreSet`] stitches several named backing stores together by id prefix.

pub mod file;
pub mod memory;
pub mod routed;
pub mod state;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{ConvoyStatus, DepType, ItemStatus, ItemType};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use routed::StoreSet;
pub use state::StoreState;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A work item as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub status: ItemStatus,
    /// Agent address, or `None` when unassigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Where a container's children are integrated once done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_point: Option<String>,
}

impl WorkItem {
    pub fn is_assigned(&self) -> bool {
        self.assignee.as_deref().is_some_and(|a| !a.trim().is_empty())
    }

    /// Interpret the status field as a convoy status.
    pub fn convoy_status(&self) -> Option<ConvoyStatus> {
        ConvoyStatus::try_from(self.status).ok()
    }
}

/// Typed dependency edge: `source` depends on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub dep_type: DepType,
}

impl DepEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, dep_type: DepType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            dep_type,
        }
    }
}

/// Request to create a work item.
///
/// When `id` is `None` the store generates one from its prefix.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub id: Option<String>,
    pub title: String,
    pub item_type: ItemType,
    pub status: ItemStatus,
    pub assignee: Option<String>,
    pub integration_point: Option<String>,
}

impl NewItem {
    pub fn new(item_type: ItemType, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            item_type,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_integration_point(mut self, point: impl Into<String>) -> Self {
        self.integration_point = Some(point.into());
        self
    }
}

/// Kind of a store event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Created,
    StatusChanged,
    Closed,
    Updated,
    DependencyAdded,
    Other(String),
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => EventKind::Created,
            "status_changed" => EventKind::StatusChanged,
            "closed" => EventKind::Closed,
            "updated" => EventKind::Updated,
            "dependency_added" => EventKind::DependencyAdded,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(k: EventKind) -> Self {
        match k {
            EventKind::Created => "created".to_string(),
            EventKind::StatusChanged => "status_changed".to_string(),
            EventKind::Closed => "closed".to_string(),
            EventKind::Updated => "updated".to_string(),
            EventKind::DependencyAdded => "dependency_added".to_string(),
            EventKind::Other(s) => s,
        }
    }
}

/// One record from a store's append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub ordinal: u64,
    pub kind: EventKind,
    pub item_id: String,
    /// New value for status-change events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl StoreEvent {
    /// Whether this event reports the item reaching `closed`.
    pub fn is_close(&self) -> bool {
        match self.kind {
            EventKind::Closed => true,
            EventKind::StatusChanged => self
                .new_value
                .as_deref()
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("closed")),
            _ => false,
        }
    }
}

/// Filter for [`WorkStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub include_closed: bool,
}

impl ItemFilter {
    pub fn convoys(include_closed: bool) -> Self {
        Self {
            item_type: Some(ItemType::Convoy),
            include_closed,
        }
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        if !self.include_closed && item.status.is_closed() {
            return false;
        }
        match &self.item_type {
            Some(t) => &item.item_type == t,
            None => true,
        }
    }
}

/// CRUD and dependency operations the scheduling core consumes.
pub trait WorkStore: Send + Sync + Debug {
    /// Fetch an item; `Ok(None)` when it does not exist.
    fn get(&self, id: &str) -> StoreFuture<'_, Option<WorkItem>>;

    fn create(&self, item: NewItem) -> StoreFuture<'_, WorkItem>;

    fn set_status(&self, id: &str, status: ItemStatus) -> StoreFuture<'_, ()>;

    /// Add an edge. Adding an edge that already exists is a no-op.
    fn add_dependency(&self, edge: DepEdge) -> StoreFuture<'_, ()>;

    /// Edges whose `source` is `id` (what `id` depends on).
    fn dependencies_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>>;

    /// Edges whose `target` is `id` (what depends on `id`).
    fn dependents_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>>;

    fn list(&self, filter: ItemFilter) -> StoreFuture<'_, Vec<WorkItem>>;
}

/// Append-only event stream of a single backing store.
pub trait EventLog: Send + Sync {
    /// Events with an ordinal strictly greater than `after`, oldest first.
    fn events_since(&self, after: u64) -> StoreFuture<'_, Vec<StoreEvent>>;
}

/// A store the feeders can both query and poll.
pub trait BackingStore: WorkStore + EventLog {}

impl<T: WorkStore + EventLog> BackingStore for T {}
