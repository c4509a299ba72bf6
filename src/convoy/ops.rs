// src/convoy/ops.rs

//! Direct convoy operations behind the CLI.

use serde::Serialize;
use tracing::{debug, info};

use crate::convoy::{
    ensure_untracked, load_convoy, track, tracked_ids, transition, Convoy,
};
use crate::errors::{ConvoyError, Result};
use crate::store::{ItemFilter, NewItem, WorkStore};
use crate::types::{ConvoyStatus, ItemStatus, ItemType};

/// Create an open convoy tracking `items`.
///
/// All items go into one convoy. Unknown items and items already tracked by
/// another active convoy are rejected before anything is written.
pub async fn create_convoy(store: &dyn WorkStore, title: &str, items: &[String]) -> Result<Convoy> {
    let items = normalize(items)?;
    ensure_exist(store, &items).await?;
    ensure_untracked(store, &items, None).await?;

    let convoy = store
        .create(NewItem::new(ItemType::Convoy, title).with_status(ItemStatus::Open))
        .await?;
    track(store, &convoy.id, &items).await?;

    info!(convoy = %convoy.id, items = items.len(), "convoy created");
    load_convoy(store, &convoy.id).await
}

/// Ad-hoc grouping: like [`create_convoy`] with a generated title.
pub async fn group_items(store: &dyn WorkStore, items: &[String]) -> Result<Convoy> {
    let items = normalize(items)?;
    create_convoy(store, &batch_title(&items), &items).await
}

/// Title used for unnamed batches: `Batch: a, b, c (+2 more)`.
pub fn batch_title(items: &[String]) -> String {
    const SHOWN: usize = 3;
    let head = items
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > SHOWN {
        format!("Batch: {head} (+{} more)", items.len() - SHOWN)
    } else {
        format!("Batch: {head}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub convoy_id: String,
    pub added: Vec<String>,
    pub reopened: bool,
}

/// Track more items. A closed convoy is reopened, since it has work again.
pub async fn add_items(store: &dyn WorkStore, convoy_id: &str, items: &[String]) -> Result<AddOutcome> {
    let items = normalize(items)?;
    let convoy = load_convoy(store, convoy_id).await?;
    ensure_exist(store, &items).await?;
    ensure_untracked(store, &items, Some(convoy_id)).await?;

    let added = track(store, convoy_id, &items).await?;

    let reopened = convoy.status == ConvoyStatus::Closed && !added.is_empty();
    if reopened {
        transition(store, convoy_id, ConvoyStatus::Open).await?;
    }

    info!(convoy = %convoy_id, added = added.len(), reopened, "items added to convoy");
    Ok(AddOutcome {
        convoy_id: convoy_id.to_string(),
        added,
        reopened,
    })
}

/// Close a convoy: cancels a staged one, completes an open one.
pub async fn close_convoy(store: &dyn WorkStore, convoy_id: &str, reason: Option<&str>) -> Result<ConvoyStatus> {
    let previous = transition(store, convoy_id, ConvoyStatus::Closed).await?;
    info!(
        convoy = %convoy_id,
        from = %previous,
        reason = reason.unwrap_or(""),
        "convoy closed"
    );
    Ok(previous)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub convoy_id: String,
    pub total: usize,
    pub closed: usize,
    /// Whether this check closed the convoy.
    pub auto_closed: bool,
}

/// Auto-close check: an open convoy whose tracked items are all closed is
/// closed. A convoy tracking nothing stays open. Convoys in any other status
/// are left untouched.
pub async fn check_convoy(store: &dyn WorkStore, convoy_id: &str) -> Result<CheckOutcome> {
    let convoy = load_convoy(store, convoy_id).await?;
    let (total, closed) = progress(store, &convoy.tracked).await?;

    let auto_closed = convoy.status == ConvoyStatus::Open && total > 0 && closed == total;
    if auto_closed {
        close_convoy(store, convoy_id, Some("all tracked items closed")).await?;
    } else {
        debug!(convoy = %convoy_id, status = %convoy.status, total, closed, "convoy stays as is");
    }

    Ok(CheckOutcome {
        convoy_id: convoy.id,
        total,
        closed,
        auto_closed,
    })
}

/// Run [`check_convoy`] over every open convoy.
pub async fn check_all(store: &dyn WorkStore) -> Result<Vec<CheckOutcome>> {
    let mut outcomes = Vec::new();
    for item in store.list(ItemFilter::convoys(false)).await? {
        if item.status == ItemStatus::Open {
            outcomes.push(check_convoy(store, &item.id).await?);
        }
    }
    Ok(outcomes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvoySummary {
    pub id: String,
    pub title: String,
    pub status: ConvoyStatus,
    pub total: usize,
    pub closed: usize,
}

/// Convoys with progress counts; closed ones only with `include_closed`.
pub async fn list_convoys(store: &dyn WorkStore, include_closed: bool) -> Result<Vec<ConvoySummary>> {
    let mut out = Vec::new();
    for item in store.list(ItemFilter::convoys(include_closed)).await? {
        let Some(status) = item.convoy_status() else {
            continue;
        };
        let tracked = tracked_ids(store, &item.id).await?;
        let (total, closed) = progress(store, &tracked).await?;
        out.push(ConvoySummary {
            id: item.id,
            title: item.title,
            status,
            total,
            closed,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedItem {
    pub id: String,
    pub title: String,
    pub item_type: String,
    /// `None` when the item could not be read from its store.
    pub status: Option<ItemStatus>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvoyDetail {
    pub id: String,
    pub title: String,
    pub status: ConvoyStatus,
    pub items: Vec<TrackedItem>,
    pub closed: usize,
}

/// Tracked items of one convoy with their current state.
pub async fn convoy_detail(store: &dyn WorkStore, convoy_id: &str) -> Result<ConvoyDetail> {
    let convoy = load_convoy(store, convoy_id).await?;
    let mut items = Vec::new();
    let mut closed = 0;

    for id in &convoy.tracked {
        let entry = match store.get(id).await {
            Ok(Some(item)) => {
                if item.status.is_closed() {
                    closed += 1;
                }
                TrackedItem {
                    id: item.id,
                    title: item.title,
                    item_type: item.item_type.to_string(),
                    status: Some(item.status),
                    assignee: item.assignee,
                }
            }
            Ok(None) | Err(_) => TrackedItem {
                id: id.clone(),
                title: String::new(),
                item_type: String::new(),
                status: None,
                assignee: None,
            },
        };
        items.push(entry);
    }

    Ok(ConvoyDetail {
        id: convoy.id,
        title: convoy.title,
        status: convoy.status,
        items,
        closed,
    })
}

/// `(total, closed)` over tracked ids. Unreadable items count as not closed.
async fn progress(store: &dyn WorkStore, tracked: &[String]) -> Result<(usize, usize)> {
    let mut closed = 0;
    for id in tracked {
        if let Ok(Some(item)) = store.get(id).await {
            if item.status.is_closed() {
                closed += 1;
            }
        }
    }
    Ok((tracked.len(), closed))
}

fn normalize(items: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    if out.is_empty() {
        return Err(ConvoyError::InvalidInput(
            "at least one work item is required".to_string(),
        ));
    }
    Ok(out)
}

async fn ensure_exist(store: &dyn WorkStore, items: &[String]) -> Result<()> {
    for id in items {
        if store.get(id).await?.is_none() {
            return Err(ConvoyError::ItemNotFound(id.clone()));
        }
    }
    Ok(())
}
