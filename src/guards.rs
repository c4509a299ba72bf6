// src/guards.rs

//! Safety guards shared by the event feeder and the stranded scanner.
//!
//! Both feeders must agree on what may be dispatched, so every dispatch
//! decision at runtime goes through [`check_candidate`] (or the two
//! primitive guards it is made of).

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{WorkItem, WorkStore};
use crate::types::ItemType;

/// Whether items of this type may be handed to an agent.
pub fn is_type_eligible(item_type: &ItemType) -> bool {
    item_type.is_leaf()
}

/// [`is_type_eligible`] for a raw type string; `""` means `task`.
pub fn is_type_name_eligible(raw: &str) -> bool {
    is_type_eligible(&ItemType::from(raw))
}

/// Whether an item waits on an unfinished execution-relevant predecessor.
///
/// Fail-open: if the store cannot answer, the item is reported as not
/// blocked so a flaky backend cannot stall a batch. The next feed cycle
/// re-checks with fresh state. Unknown items and predecessors that cannot
/// be read are not blocking either.
pub async fn is_blocked(store: &dyn WorkStore, id: &str) -> bool {
    let deps = match store.dependencies_of(id).await {
        Ok(deps) => deps,
        Err(e) => {
            warn!(item = %id, error = %e, "blocking check failed; treating as not blocked");
            return false;
        }
    };

    for edge in deps.iter().filter(|e| e.dep_type.is_execution_relevant()) {
        match store.get(&edge.target).await {
            Ok(Some(pred)) if !pred.status.is_closed() => {
                debug!(
                    item = %id,
                    blocked_by = %pred.id,
                    dep_type = %edge.dep_type,
                    "item is blocked"
                );
                return true;
            }
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => {
                warn!(
                    item = %id,
                    predecessor = %edge.target,
                    error = %e,
                    "predecessor lookup failed; ignoring edge"
                );
            }
        }
    }

    false
}

/// [`is_blocked`] bounded by a timeout; a timeout counts as not blocked.
pub async fn is_blocked_within(store: &dyn WorkStore, id: &str, limit: Duration) -> bool {
    match tokio::time::timeout(limit, is_blocked(store, id)).await {
        Ok(blocked) => blocked,
        Err(_) => {
            warn!(item = %id, ?limit, "blocking check timed out; treating as not blocked");
            false
        }
    }
}

/// Why a tracked item is not a dispatch candidate right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotOpen,
    Assigned,
    IneligibleType,
    Blocked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NotOpen => "not open",
            SkipReason::Assigned => "already assigned",
            SkipReason::IneligibleType => "type is not dispatchable",
            SkipReason::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Full runtime eligibility check for one tracked item.
pub async fn check_candidate(
    store: &dyn WorkStore,
    item: &WorkItem,
    limit: Duration,
) -> Result<(), SkipReason> {
    if item.status != crate::types::ItemStatus::Open {
        return Err(SkipReason::NotOpen);
    }
    if item.is_assigned() {
        return Err(SkipReason::Assigned);
    }
    if !is_type_eligible(&item.item_type) {
        return Err(SkipReason::IneligibleType);
    }
    if is_blocked_within(store, &item.id, limit).await {
        return Err(SkipReason::Blocked);
    }
    Ok(())
}
