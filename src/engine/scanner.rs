// src/engine/scanner.rs

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::SharedContext;
use crate::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Entries reported by stranded discovery.
    pub stranded: usize,
    /// `(convoy, item)` pairs dispatched.
    pub dispatched: Vec<(String, String)>,
    /// Convoys an auto-close check was requested for.
    pub close_checks: Vec<String>,
}

/// Periodic reconciliation: independently of events, feed or close every
/// convoy stranded discovery reports.
#[derive(Debug)]
pub struct StrandedScanner {
    ctx: SharedContext,
    /// Serializes `scan`; concurrent scans could double-dispatch.
    scan_lock: Mutex<()>,
}

impl StrandedScanner {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            scan_lock: Mutex::new(()),
        }
    }

    /// Run one scan.
    ///
    /// A discovery failure fails the whole scan; the lock is released and the
    /// next tick retries. A successful scan clears recovery mode.
    pub async fn scan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock().await;
        self.ctx.ensure_stores();

        let cancel = self.ctx.cancel_token();
        let stranded = self.ctx.dispatcher().query_stranded(cancel).await?;
        let store = self.ctx.store_set();

        let mut summary = ScanSummary {
            stranded: stranded.len(),
            ..ScanSummary::default()
        };

        for entry in stranded {
            if entry.ready_count == 0 || entry.ready_item_ids.is_empty() {
                match self
                    .ctx
                    .dispatcher()
                    .check_convoy(&entry.convoy_id, cancel)
                    .await
                {
                    Ok(()) => summary.close_checks.push(entry.convoy_id),
                    Err(e) => warn!(convoy = %entry.convoy_id, error = %e, "convoy check failed"),
                }
                continue;
            }

            match self
                .ctx
                .dispatch_first_ready(&store, &entry.convoy_id, &entry.ready_item_ids, false)
                .await
            {
                Some(item) => summary.dispatched.push((entry.convoy_id, item)),
                None => debug!(
                    convoy = %entry.convoy_id,
                    title = %entry.title,
                    ready = entry.ready_count,
                    "no stranded item could be dispatched"
                ),
            }
        }

        if summary.stranded > 0 {
            info!(
                stranded = summary.stranded,
                dispatched = summary.dispatched.len(),
                close_checks = summary.close_checks.len(),
                "stranded scan complete"
            );
        }
        self.ctx.set_recovery(false);
        Ok(summary)
    }
}
