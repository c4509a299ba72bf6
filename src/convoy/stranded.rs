// src/convoy/stranded.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convoy::tracked_ids;
use crate::errors::Result;
use crate::guards;
use crate::store::{ItemFilter, WorkStore};
use crate::types::ItemStatus;

/// An open convoy that needs attention from the scanner.
///
/// `ready_count == 0` means every tracked item is closed and the convoy only
/// needs its auto-close check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrandedConvoy {
    pub convoy_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ready_count: usize,
    #[serde(default)]
    pub ready_item_ids: Vec<String>,
}

/// Open convoys with ready work and nothing in flight, plus open convoys
/// whose tracked items are all closed.
///
/// An item is ready when it is open, unassigned, of a dispatchable type and
/// not blocked. It is in flight when it is `in_progress`, `hooked`, or open
/// with an assignee. Unreadable items are neither.
pub async fn find_stranded(store: &dyn WorkStore, block_timeout: Duration) -> Result<Vec<StrandedConvoy>> {
    let mut out = Vec::new();

    for convoy in store.list(ItemFilter::convoys(false)).await? {
        if convoy.status != ItemStatus::Open {
            continue;
        }
        let tracked = tracked_ids(store, &convoy.id).await?;
        if tracked.is_empty() {
            continue;
        }

        let mut ready = Vec::new();
        let mut in_flight = false;
        let mut all_closed = true;

        for id in &tracked {
            let Ok(Some(item)) = store.get(id).await else {
                all_closed = false;
                continue;
            };
            if !item.status.is_closed() {
                all_closed = false;
            }
            if item.status.is_in_flight() || (item.status == ItemStatus::Open && item.is_assigned()) {
                in_flight = true;
                continue;
            }
            if guards::check_candidate(store, &item, block_timeout).await.is_ok() {
                ready.push(item.id);
            }
        }

        if all_closed {
            out.push(StrandedConvoy {
                convoy_id: convoy.id,
                title: convoy.title,
                ready_count: 0,
                ready_item_ids: Vec::new(),
            });
        } else if !ready.is_empty() && !in_flight {
            out.push(StrandedConvoy {
                convoy_id: convoy.id,
                title: convoy.title,
                ready_count: ready.len(),
                ready_item_ids: ready,
            });
        } else {
            debug!(convoy = %convoy.id, ready = ready.len(), in_flight, "convoy is progressing");
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DepEdge, MemoryStore, NewItem};
    use crate::types::{DepType, ItemType};

    async fn convoy_over(store: &MemoryStore, items: &[&str]) -> String {
        let convoy = store
            .create(NewItem::new(ItemType::Convoy, "batch").with_status(ItemStatus::Open))
            .await
            .unwrap();
        for item in items {
            store
                .add_dependency(DepEdge::new(convoy.id.as_str(), *item, DepType::Tracks))
                .await
                .unwrap();
        }
        convoy.id
    }

    async fn task(store: &MemoryStore, id: &str, status: ItemStatus) {
        store
            .create(NewItem::new(ItemType::Task, id).with_id(id).with_status(status))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ready_work_with_nothing_in_flight_is_stranded() {
        let store = MemoryStore::new("gt-");
        task(&store, "gt-a", ItemStatus::Closed).await;
        task(&store, "gt-b", ItemStatus::Open).await;
        let id = convoy_over(&store, &["gt-a", "gt-b"]).await;

        let found = find_stranded(&store, Duration::from_secs(1)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].convoy_id, id);
        assert_eq!(found[0].ready_item_ids, vec!["gt-b".to_string()]);
    }

    #[tokio::test]
    async fn in_flight_work_is_not_stranded() {
        let store = MemoryStore::new("gt-");
        task(&store, "gt-a", ItemStatus::InProgress).await;
        task(&store, "gt-b", ItemStatus::Open).await;
        convoy_over(&store, &["gt-a", "gt-b"]).await;

        let found = find_stranded(&store, Duration::from_secs(1)).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn fully_closed_convoy_reports_zero_ready() {
        let store = MemoryStore::new("gt-");
        task(&store, "gt-a", ItemStatus::Closed).await;
        convoy_over(&store, &["gt-a"]).await;

        let found = find_stranded(&store, Duration::from_secs(1)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ready_count, 0);
    }
}
