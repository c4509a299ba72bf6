// src/engine/manager.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{
    EngineContext, EventFeeder, ManagerSettings, ScanSummary, SharedContext, StoreAcquirer,
    StrandedScanner,
};
use crate::errors::Result;
use crate::exec::Dispatcher;
use crate::routing::Routes;

/// Scanner timer state, driven by the recovery flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCadence {
    Normal,
    Recovery,
}

impl ScanCadence {
    pub fn interval(self, settings: &ManagerSettings) -> Duration {
        match self {
            ScanCadence::Normal => settings.scan_interval,
            ScanCadence::Recovery => settings.recovery_interval,
        }
    }
}

/// Owns the event feeder loop, the scanner loop and the startup sweep.
#[derive(Debug)]
pub struct ConvoyManager {
    ctx: SharedContext,
    feeder: Arc<EventFeeder>,
    scanner: Arc<StrandedScanner>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConvoyManager {
    pub fn new(
        acquire: StoreAcquirer,
        routes: Routes,
        dispatcher: Arc<dyn Dispatcher>,
        settings: ManagerSettings,
    ) -> Self {
        let ctx = Arc::new(EngineContext::new(acquire, routes, dispatcher, settings));
        Self {
            feeder: Arc::new(EventFeeder::new(ctx.clone())),
            scanner: Arc::new(StrandedScanner::new(ctx.clone())),
            ctx,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn feeder(&self) -> &EventFeeder {
        &self.feeder
    }

    pub fn in_recovery(&self) -> bool {
        self.ctx.in_recovery()
    }

    pub fn cadence(&self) -> ScanCadence {
        if self.ctx.in_recovery() {
            ScanCadence::Recovery
        } else {
            ScanCadence::Normal
        }
    }

    /// Spawn both loops and the startup sweep.
    ///
    /// Returns `false` (and does nothing) if already started.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("convoy manager already started");
            return false;
        }

        let handles = vec![
            tokio::spawn(feeder_loop(self.ctx.clone(), self.feeder.clone())),
            tokio::spawn(scanner_loop(self.ctx.clone(), self.scanner.clone())),
            tokio::spawn(startup_sweep(self.ctx.clone(), self.scanner.clone())),
        ];
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.extend(handles),
            Err(_) => warn!("task list lock poisoned; loops will not be joined on stop"),
        }

        info!(settings = ?self.ctx.settings(), "convoy manager started");
        true
    }

    /// Cancel, wait for every loop to finish, then release store handles.
    pub async fn stop(&self) {
        self.ctx.cancel_token().cancel();

        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "feeder task ended abnormally");
            }
        }

        self.ctx.release_stores();
        info!("convoy manager stopped");
    }

    /// Run a scan now, serialized with the scanner's own runs.
    pub async fn scan_now(&self) -> Result<ScanSummary> {
        self.scanner.scan().await
    }
}

async fn feeder_loop(ctx: SharedContext, feeder: Arc<EventFeeder>) {
    let mut ticker = tokio::time::interval(ctx.settings().poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let cancel = ctx.cancel_token().clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let summary = feeder.poll_once().await;
                if !summary.dispatched.is_empty() || !summary.close_checks.is_empty() {
                    debug!(?summary, "feed cycle");
                }
            }
        }
    }
    debug!("event feeder loop finished");
}

async fn scanner_loop(ctx: SharedContext, scanner: Arc<StrandedScanner>) {
    let cancel = ctx.cancel_token().clone();
    run_scan(&scanner).await;

    loop {
        let cadence = if ctx.in_recovery() {
            ScanCadence::Recovery
        } else {
            ScanCadence::Normal
        };
        let delay = cadence.interval(ctx.settings());

        tokio::select! {
            _ = cancel.cancelled() => break,
            // Re-arm the timer with the new cadence.
            _ = ctx.recovery_changed() => continue,
            _ = tokio::time::sleep(delay) => run_scan(&scanner).await,
        }
    }
    debug!("stranded scanner loop finished");
}

async fn startup_sweep(ctx: SharedContext, scanner: Arc<StrandedScanner>) {
    let cancel = ctx.cancel_token().clone();
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(ctx.settings().startup_grace) => {
            debug!("startup grace elapsed; sweeping");
            run_scan(&scanner).await;
        }
    }
}

async fn run_scan(scanner: &StrandedScanner) {
    if let Err(e) = scanner.scan().await {
        warn!(error = %e, "stranded scan failed");
    }
}
