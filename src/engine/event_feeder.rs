// src/engine/event_feeder.rs

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};

use crate::convoy::{convoys_tracking, tracked_ids};
use crate::engine::SharedContext;
use crate::errors::Result;
use crate::store::{StoreSet, WorkStore};
use crate::types::ItemStatus;

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Stores whose marks were advanced without processing events.
    pub warmed: Vec<String>,
    /// Distinct close transitions acted on.
    pub closes: Vec<String>,
    /// `(convoy, item)` pairs dispatched.
    pub dispatched: Vec<(String, String)>,
    /// Convoys an auto-close check was requested for.
    pub close_checks: Vec<String>,
    /// Stores whose poll failed.
    pub failed_stores: Vec<String>,
}

/// Reacts to close events by feeding the next ready item of each affected
/// open convoy.
///
/// Marks and the processed set live only in this process; after a restart
/// the warm-up cycle skips history and the stranded scanner covers the gap.
#[derive(Debug)]
pub struct EventFeeder {
    ctx: SharedContext,
    /// Last event ordinal seen per store.
    marks: DashMap<String, u64>,
    /// Items whose close has already been acted on.
    processed: DashSet<String>,
    /// Closes whose handling failed; retried on the next cycle.
    retry: DashSet<String>,
    warmed_up: AtomicBool,
}

impl EventFeeder {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            marks: DashMap::new(),
            processed: DashSet::new(),
            retry: DashSet::new(),
            warmed_up: AtomicBool::new(false),
        }
    }

    pub fn mark(&self, store: &str) -> Option<u64> {
        self.marks.get(store).map(|m| *m)
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up.load(Ordering::SeqCst)
    }

    /// One poll cycle over every non-paused store.
    pub async fn poll_once(&self) -> FeedSummary {
        let mut summary = FeedSummary::default();
        if !self.ctx.ensure_stores() {
            return summary;
        }

        let stores = self.ctx.snapshot();
        let warm_up = !self.is_warmed_up();
        let mut closes: BTreeSet<String> = BTreeSet::new();
        let mut polled_any = false;

        for (name, store) in &stores {
            if self.ctx.routes().is_paused(name) {
                debug!(store = %name, "store paused; not polling");
                continue;
            }
            polled_any = true;

            let previous = self.mark(name);
            let events = match self.ctx.timed(store.events_since(previous.unwrap_or(0))).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(store = %name, error = %e, "event poll failed");
                    summary.failed_stores.push(name.clone());
                    self.ctx.set_recovery(true);
                    continue;
                }
            };

            let max = events.iter().map(|e| e.ordinal).max();
            let new_mark = previous.unwrap_or(0).max(max.unwrap_or(0));
            self.marks.insert(name.clone(), new_mark);

            // First sight of a store (global warm-up, or a store acquired
            // later) only positions the mark.
            if warm_up || previous.is_none() {
                debug!(store = %name, mark = new_mark, skipped = events.len(), "warming up store");
                summary.warmed.push(name.clone());
                continue;
            }

            for event in events.iter().filter(|e| e.is_close()) {
                closes.insert(event.item_id.clone());
            }
        }

        if warm_up && polled_any {
            self.warmed_up.store(true, Ordering::SeqCst);
            info!(stores = summary.warmed.len(), "event feeder warmed up");
        }

        let retries: Vec<String> = self.retry.iter().map(|r| r.key().clone()).collect();
        for item in retries {
            self.retry.remove(&item);
            closes.insert(item);
        }

        if closes.is_empty() {
            return summary;
        }

        let set = StoreSet::new(stores, self.ctx.routes().clone());
        for item in closes {
            if self.processed.contains(&item) {
                debug!(item = %item, "close already processed");
                continue;
            }
            summary.closes.push(item.clone());
            match self.handle_close(&set, &item, &mut summary).await {
                Ok(()) => {
                    self.processed.insert(item);
                }
                Err(e) => {
                    warn!(item = %item, error = %e, "handling close failed; retrying next cycle");
                    self.retry.insert(item);
                }
            }
        }

        summary
    }

    async fn handle_close(&self, store: &StoreSet, item: &str, summary: &mut FeedSummary) -> Result<()> {
        let convoys = self.ctx.timed(convoys_tracking(store, item)).await?;
        if convoys.is_empty() {
            debug!(item, "closed item is not tracked by any convoy");
        }

        for convoy_id in convoys {
            let Some(convoy) = self.ctx.timed(store.get(&convoy_id)).await? else {
                continue;
            };
            if convoy.status != ItemStatus::Open {
                debug!(convoy = %convoy_id, status = %convoy.status, "convoy not open; skipping");
                continue;
            }

            let tracked = self.ctx.timed(tracked_ids(store, &convoy_id)).await?;
            if self.all_closed(store, &tracked).await {
                info!(convoy = %convoy_id, "all tracked items closed; requesting check");
                match self
                    .ctx
                    .dispatcher()
                    .check_convoy(&convoy_id, self.ctx.cancel_token())
                    .await
                {
                    Ok(()) => summary.close_checks.push(convoy_id),
                    Err(e) => warn!(convoy = %convoy_id, error = %e, "convoy check failed"),
                }
                continue;
            }

            if let Some(fed) = self
                .ctx
                .dispatch_first_ready(store, &convoy_id, &tracked, true)
                .await
            {
                summary.dispatched.push((convoy_id, fed));
            } else {
                debug!(convoy = %convoy_id, "no ready item to feed");
            }
        }
        Ok(())
    }

    /// Unreadable items count as not closed.
    async fn all_closed(&self, store: &dyn WorkStore, tracked: &[String]) -> bool {
        for id in tracked {
            match self.ctx.timed(store.get(id)).await {
                Ok(Some(item)) if item.status.is_closed() => {}
                _ => return false,
            }
        }
        true
    }
}
