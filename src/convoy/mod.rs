// src/convoy/mod.rs

//! Convoys: tracked groupings of work items.
//!
//! A convoy is a work item of type `convoy` whose status field carries a
//! [`ConvoyStatus`] and whose `tracks` edges name its members.
//!
//! - [`ops`] implements direct creation, grouping, add/close/check/list.
//! - [`stranded`] derives which open convoys have ready work nobody is on.

pub mod ops;
pub mod stranded;

use serde::Serialize;
use tracing::info;

use crate::errors::{ConvoyError, Result};
use crate::store::{DepEdge, WorkItem, WorkStore};
use crate::types::{ConvoyStatus, DepType, ItemType};

pub use ops::{
    add_items, check_all, check_convoy, close_convoy, convoy_detail, create_convoy, group_items,
    list_convoys, AddOutcome, CheckOutcome, ConvoyDetail, ConvoySummary, TrackedItem,
};
pub use stranded::{find_stranded, StrandedConvoy};

/// A convoy as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Convoy {
    pub id: String,
    pub title: String,
    pub status: ConvoyStatus,
    /// Tracked item ids, sorted.
    pub tracked: Vec<String>,
}

/// Load a convoy and its tracked set.
pub async fn load_convoy(store: &dyn WorkStore, id: &str) -> Result<Convoy> {
    let item = store
        .get(id)
        .await?
        .ok_or_else(|| ConvoyError::ItemNotFound(id.to_string()))?;
    let status = convoy_status_of(&item)?;
    let tracked = tracked_ids(store, id).await?;

    Ok(Convoy {
        id: item.id,
        title: item.title,
        status,
        tracked,
    })
}

fn convoy_status_of(item: &WorkItem) -> Result<ConvoyStatus> {
    if item.item_type != ItemType::Convoy {
        return Err(ConvoyError::InvalidInput(format!(
            "{} is a {}, not a convoy",
            item.id, item.item_type
        )));
    }
    item.convoy_status().ok_or_else(|| {
        ConvoyError::Store(format!(
            "convoy {} has non-convoy status {}",
            item.id, item.status
        ))
    })
}

/// Ids tracked by a convoy, sorted and deduplicated.
pub async fn tracked_ids(store: &dyn WorkStore, convoy_id: &str) -> Result<Vec<String>> {
    let mut ids: Vec<String> = store
        .dependencies_of(convoy_id)
        .await?
        .into_iter()
        .filter(|e| e.dep_type == DepType::Tracks)
        .map(|e| e.target)
        .collect();
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Ids of convoys that track `item_id` (any status), sorted.
pub async fn convoys_tracking(store: &dyn WorkStore, item_id: &str) -> Result<Vec<String>> {
    let mut ids: Vec<String> = store
        .dependents_of(item_id)
        .await?
        .into_iter()
        .filter(|e| e.dep_type == DepType::Tracks)
        .map(|e| e.source)
        .collect();
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Move a convoy to `to`, enforcing the status state machine.
///
/// Returns the previous status.
pub async fn transition(store: &dyn WorkStore, convoy_id: &str, to: ConvoyStatus) -> Result<ConvoyStatus> {
    let item = store
        .get(convoy_id)
        .await?
        .ok_or_else(|| ConvoyError::ItemNotFound(convoy_id.to_string()))?;
    let from = convoy_status_of(&item)?;

    if !from.can_transition_to(to) {
        return Err(ConvoyError::InvalidTransition {
            convoy: convoy_id.to_string(),
            from,
            to,
        });
    }

    if from != to {
        store.set_status(convoy_id, to.into()).await?;
        info!(convoy = %convoy_id, %from, %to, "convoy status changed");
    }
    Ok(from)
}

/// Reject items that already belong to an active convoy other than `except`.
pub async fn ensure_untracked(
    store: &dyn WorkStore,
    items: &[String],
    except: Option<&str>,
) -> Result<()> {
    for item in items {
        for convoy_id in convoys_tracking(store, item).await? {
            if Some(convoy_id.as_str()) == except {
                continue;
            }
            let active = match store.get(&convoy_id).await? {
                Some(c) => c.convoy_status().is_some_and(|s| s.is_active()),
                None => false,
            };
            if active {
                return Err(ConvoyError::AlreadyTracked {
                    item: item.clone(),
                    convoy: convoy_id,
                });
            }
        }
    }
    Ok(())
}

/// Add `tracks` edges for items the convoy does not track yet.
///
/// Returns the ids that were newly tracked.
pub async fn track(store: &dyn WorkStore, convoy_id: &str, items: &[String]) -> Result<Vec<String>> {
    let existing = tracked_ids(store, convoy_id).await?;
    let mut added = Vec::new();
    for item in items {
        if existing.contains(item) || added.contains(item) {
            continue;
        }
        store
            .add_dependency(DepEdge::new(convoy_id, item.as_str(), DepType::Tracks))
            .await?;
        added.push(item.clone());
    }
    Ok(added)
}
