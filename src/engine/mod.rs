// src/engine/mod.rs

//! Runtime feeders.
//!
//! This module ties together:
//! - the event-driven feeder, which reacts to close events in the stores'
//!   event logs ([`event_feeder`]),
//! - the stranded scanner, which periodically re-derives which convoys need
//!   a push ([`scanner`]),
//! - the manager that owns both loops, lazy store acquisition and the
//!   recovery cadence ([`manager`]).
//!
//! All three share one [`EngineContext`]: the store handle map, routing,
//! the dispatcher, settings, the recovery flag and the cancellation token.

pub mod event_feeder;
pub mod manager;
pub mod scanner;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ConvoyError, Result};
use crate::exec::Dispatcher;
use crate::guards;
use crate::routing::Routes;
use crate::store::{BackingStore, StoreSet, WorkStore};

pub use event_feeder::{EventFeeder, FeedSummary};
pub use manager::{ConvoyManager, ScanCadence};
pub use scanner::{ScanSummary, StrandedScanner};

/// Named backing-store handles.
pub type StoreMap = BTreeMap<String, Arc<dyn BackingStore>>;

/// Lazy store acquisition callback. May return an empty or partial map while
/// the backing service is not ready yet; it is called again on every tick.
pub type StoreAcquirer = Arc<dyn Fn() -> Result<StoreMap> + Send + Sync>;

/// Timing knobs for the feeders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub poll_interval: Duration,
    /// Bound on every individual store call made by the feeders.
    pub store_timeout: Duration,
    pub scan_interval: Duration,
    pub recovery_interval: Duration,
    pub startup_grace: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            store_timeout: Duration::from_secs(10),
            scan_interval: Duration::from_secs(30),
            recovery_interval: Duration::from_secs(10),
            startup_grace: Duration::from_secs(60),
        }
    }
}

/// State shared by the feeders and the manager.
pub struct EngineContext {
    stores: Mutex<StoreMap>,
    acquire: StoreAcquirer,
    routes: Routes,
    dispatcher: Arc<dyn Dispatcher>,
    settings: ManagerSettings,
    recovery: AtomicBool,
    recovery_changed: Notify,
    cancel: CancellationToken,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("routes", &self.routes)
            .field("settings", &self.settings)
            .field("recovery", &self.in_recovery())
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    pub fn new(
        acquire: StoreAcquirer,
        routes: Routes,
        dispatcher: Arc<dyn Dispatcher>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            stores: Mutex::new(StoreMap::new()),
            acquire,
            routes,
            dispatcher,
            settings,
            recovery: AtomicBool::new(false),
            recovery_changed: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.dispatcher.as_ref()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Acquire store handles that are not held yet.
    ///
    /// Held handles are kept as they are. Stores that become available after
    /// the first acquisition are merged in on a later tick. Returns whether
    /// at least one handle is available afterwards.
    pub fn ensure_stores(&self) -> bool {
        let Ok(mut stores) = self.stores.lock() else {
            warn!("store map lock poisoned");
            return false;
        };
        match (self.acquire)() {
            Ok(acquired) => {
                let mut added = Vec::new();
                for (name, store) in acquired {
                    if let Entry::Vacant(slot) = stores.entry(name) {
                        added.push(slot.key().clone());
                        slot.insert(store);
                    }
                }
                if !added.is_empty() {
                    info!(stores = ?added, held = stores.len(), "store handles acquired");
                } else if stores.is_empty() {
                    debug!("no store handles available yet");
                }
            }
            Err(e) => warn!(error = %e, "store acquisition failed; will retry"),
        }
        !stores.is_empty()
    }

    /// Point-in-time copy of the store map. The lock is released before
    /// any store call is made.
    pub fn snapshot(&self) -> StoreMap {
        self.stores
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Routed view over the current snapshot.
    pub fn store_set(&self) -> StoreSet {
        StoreSet::new(self.snapshot(), self.routes.clone())
    }

    /// Drop every held store handle.
    pub fn release_stores(&self) {
        if let Ok(mut stores) = self.stores.lock() {
            let released = stores.len();
            stores.clear();
            debug!(released, "store handles released");
        }
    }

    pub fn in_recovery(&self) -> bool {
        self.recovery.load(Ordering::SeqCst)
    }

    /// Flip recovery mode. Entering it wakes the scanner so its current
    /// timer is replaced by the recovery interval.
    pub fn set_recovery(&self, on: bool) {
        let was = self.recovery.swap(on, Ordering::SeqCst);
        if was != on {
            if on {
                warn!("entering recovery mode");
            } else {
                info!("leaving recovery mode");
            }
            self.recovery_changed.notify_one();
        }
    }

    pub(crate) async fn recovery_changed(&self) {
        self.recovery_changed.notified().await
    }

    /// Bound a store call by `store_timeout`.
    pub async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.settings.store_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConvoyError::Timeout(limit))?
    }

    /// Dispatch the first of `ids` that resolves to an available target,
    /// passes the guards and dispatches successfully.
    ///
    /// With `require_readable`, items whose state cannot be read are
    /// skipped; otherwise an unreachable store skips the guards.
    pub async fn dispatch_first_ready(
        &self,
        store: &dyn WorkStore,
        convoy: &str,
        ids: &[String],
        require_readable: bool,
    ) -> Option<String> {
        for id in ids {
            let Some(target) = self.routes.target_for(id) else {
                debug!(convoy, item = %id, "no target for item; skipping");
                continue;
            };
            if target.paused {
                debug!(convoy, item = %id, target = %target.name, "target paused; skipping");
                continue;
            }

            match self.timed(store.get(id)).await {
                Ok(Some(item)) => {
                    if let Err(reason) =
                        guards::check_candidate(store, &item, self.settings.store_timeout).await
                    {
                        debug!(convoy, item = %id, %reason, "not a dispatch candidate");
                        continue;
                    }
                }
                Ok(None) => {
                    debug!(convoy, item = %id, "item not found; skipping");
                    continue;
                }
                Err(e) if require_readable => {
                    warn!(convoy, item = %id, error = %e, "item unreadable; skipping");
                    continue;
                }
                Err(e) => {
                    warn!(convoy, item = %id, error = %e, "store unreachable; dispatching without guards");
                }
            }

            match self
                .dispatcher
                .dispatch(id, &target.name, &self.cancel)
                .await
            {
                Ok(()) => {
                    info!(convoy, item = %id, target = %target.name, "fed convoy");
                    return Some(id.clone());
                }
                Err(e) => {
                    warn!(convoy, item = %id, target = %target.name, error = %e, "dispatch failed; trying next");
                }
            }
        }
        None
    }
}

/// Shared handle type.
pub type SharedContext = Arc<EngineContext>;
