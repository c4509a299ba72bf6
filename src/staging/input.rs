// src/staging/input.rs

//! Staging input resolution and descriptor collection.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::convoy::{load_convoy, Convoy};
use crate::dag::ItemDescriptor;
use crate::errors::{ConvoyError, Result};
use crate::store::{WorkItem, WorkStore};
use crate::types::{DepType, ItemType};

/// What a staging run starts from. Exactly one kind per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    /// An epic or sub-epic; all descendants are staged.
    Container(String),
    /// Explicit leaf items.
    Items(Vec<String>),
    /// An existing staged convoy, re-staged against its tracked set.
    Convoy(String),
}

impl StageInput {
    /// Classify command-line roots by looking each one up.
    ///
    /// Rejects unknown ids, mixes of a container or convoy with anything
    /// else, and explicit items that are neither leaves nor containers.
    pub async fn resolve(store: &dyn WorkStore, args: &[String]) -> Result<Self> {
        let mut roots: Vec<WorkItem> = Vec::new();
        let mut leaves: Vec<String> = Vec::new();

        let mut seen = BTreeSet::new();
        for raw in args {
            let id = raw.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            let item = store
                .get(id)
                .await?
                .ok_or_else(|| ConvoyError::ItemNotFound(id.to_string()))?;

            if item.item_type.is_container() || item.item_type == ItemType::Convoy {
                roots.push(item);
            } else if item.item_type.is_leaf() {
                leaves.push(item.id);
            } else {
                return Err(ConvoyError::InvalidInput(format!(
                    "{} is a {} and cannot be staged",
                    item.id, item.item_type
                )));
            }
        }

        match (roots.len(), leaves.is_empty()) {
            (0, true) => Err(ConvoyError::InvalidInput(
                "nothing to stage: give a container, a staged convoy or work items".to_string(),
            )),
            (0, false) => Ok(StageInput::Items(leaves)),
            (1, true) => {
                let root = roots.remove(0);
                if root.item_type == ItemType::Convoy {
                    Ok(StageInput::Convoy(root.id))
                } else {
                    Ok(StageInput::Container(root.id))
                }
            }
            (1, false) => Err(ConvoyError::InvalidInput(format!(
                "{} cannot be staged together with explicit items",
                roots[0].id
            ))),
            _ => Err(ConvoyError::InvalidInput(format!(
                "only one container or convoy may be staged at a time (got {})",
                roots
                    .iter()
                    .map(|r| r.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// A container seen while walking the hierarchy.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub children: usize,
    pub has_integration_point: bool,
}

/// Everything read from the store for one staging run.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Descriptors of the items considered for the batch, sorted by id.
    pub descriptors: Vec<ItemDescriptor>,
    pub containers: Vec<ContainerInfo>,
    /// Title of the root container, if staging from one.
    pub root_title: Option<String>,
    /// The convoy being re-staged, if any.
    pub convoy: Option<Convoy>,
}

/// Read descriptors and edges for `input` from the store.
pub async fn collect(store: &dyn WorkStore, input: &StageInput) -> Result<Collected> {
    let mut collected = Collected::default();

    let ids: Vec<String> = match input {
        StageInput::Items(ids) => ids.clone(),
        StageInput::Convoy(id) => {
            let convoy = load_convoy(store, id).await?;
            let ids = convoy.tracked.clone();
            collected.convoy = Some(convoy);
            ids
        }
        StageInput::Container(root) => {
            let root_item = store
                .get(root)
                .await?
                .ok_or_else(|| ConvoyError::ItemNotFound(root.clone()))?;
            collected.root_title = Some(root_item.title.clone());
            walk_container(store, root_item, &mut collected.containers).await?
        }
    };

    for id in ids {
        let Some(item) = store.get(&id).await? else {
            debug!(item = %id, "tracked item no longer exists; skipping");
            continue;
        };
        let deps = store.dependencies_of(&id).await?;
        collected.descriptors.push(ItemDescriptor {
            id: item.id,
            title: item.title,
            item_type: item.item_type,
            deps,
        });
    }
    collected.descriptors.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(collected)
}

/// Breadth-first walk through `parent-child` edges. Returns leaf ids.
async fn walk_container(
    store: &dyn WorkStore,
    root: WorkItem,
    containers: &mut Vec<ContainerInfo>,
) -> Result<Vec<String>> {
    let mut leaves = Vec::new();
    let mut visited = BTreeSet::from([root.id.clone()]);
    let mut queue = VecDeque::from([root]);

    while let Some(container) = queue.pop_front() {
        let mut children: Vec<String> = store
            .dependents_of(&container.id)
            .await?
            .into_iter()
            .filter(|e| e.dep_type == DepType::ParentChild)
            .map(|e| e.source)
            .collect();
        children.sort();
        children.dedup();

        containers.push(ContainerInfo {
            id: container.id.clone(),
            children: children.len(),
            has_integration_point: container
                .integration_point
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty()),
        });

        for child_id in children {
            if !visited.insert(child_id.clone()) {
                continue;
            }
            let Some(child) = store.get(&child_id).await? else {
                continue;
            };
            if child.item_type.is_container() {
                queue.push_back(child);
            } else if child.item_type.is_leaf() {
                leaves.push(child.id);
            }
        }
    }

    Ok(leaves)
}
