use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use convoy::convoy::{check_convoy, find_stranded, StrandedConvoy};
use convoy::errors::ConvoyError;
use convoy::exec::{parse_stranded, DispatchFuture, Dispatcher};
use convoy::store::WorkStore;
use convoy::types::ItemStatus;
use tokio_util::sync::CancellationToken;

/// A fake dispatcher that:
/// - records every dispatch and convoy check,
/// - fails dispatches for configured items,
/// - answers stranded discovery from raw output (parsed like the real
///   command's stdout) or by deriving it from a store,
/// - optionally marks dispatched items `hooked` in that store, the way a
///   real hand-off would.
#[derive(Debug, Clone, Default)]
pub struct FakeDispatcher {
    dispatched: Arc<Mutex<Vec<(String, String)>>>,
    checks: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<BTreeSet<String>>>,
    stranded_raw: Arc<Mutex<Option<String>>>,
    store: Option<Arc<dyn WorkStore>>,
    stranded_calls: Arc<AtomicUsize>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `store` for stranded discovery, convoy checks and hooking.
    pub fn with_store(store: Arc<dyn WorkStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn fail_item(&self, item: &str) {
        self.failing.lock().unwrap().insert(item.to_string());
    }

    pub fn set_stranded(&self, entries: &[StrandedConvoy]) {
        let raw = serde_json::to_string(entries).unwrap();
        *self.stranded_raw.lock().unwrap() = Some(raw);
    }

    /// Raw stdout for the next stranded queries.
    pub fn set_stranded_raw(&self, raw: &str) {
        *self.stranded_raw.lock().unwrap() = Some(raw.to_string());
    }

    pub fn dispatched(&self) -> Vec<(String, String)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatched_items(&self) -> Vec<String> {
        self.dispatched().into_iter().map(|(item, _)| item).collect()
    }

    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().unwrap().clone()
    }

    pub fn stranded_calls(&self) -> usize {
        self.stranded_calls.load(Ordering::SeqCst)
    }
}

impl Dispatcher for FakeDispatcher {
    fn dispatch<'a>(
        &'a self,
        item: &'a str,
        target: &'a str,
        _cancel: &'a CancellationToken,
    ) -> DispatchFuture<'a, ()> {
        Box::pin(async move {
            self.dispatched
                .lock()
                .unwrap()
                .push((item.to_string(), target.to_string()));

            if self.failing.lock().unwrap().contains(item) {
                return Err(ConvoyError::Dispatch {
                    item: item.to_string(),
                    target: target.to_string(),
                    reason: "simulated failure".to_string(),
                });
            }
            if let Some(store) = &self.store {
                store.set_status(item, ItemStatus::Hooked).await?;
            }
            Ok(())
        })
    }

    fn query_stranded<'a>(&'a self, _cancel: &'a CancellationToken) -> DispatchFuture<'a, Vec<StrandedConvoy>> {
        Box::pin(async move {
            self.stranded_calls.fetch_add(1, Ordering::SeqCst);
            let raw = self.stranded_raw.lock().unwrap().clone();
            match (raw, &self.store) {
                (Some(raw), _) => parse_stranded(&raw),
                (None, Some(store)) => {
                    find_stranded(store.as_ref(), std::time::Duration::from_secs(1)).await
                }
                (None, None) => Ok(Vec::new()),
            }
        })
    }

    fn check_convoy<'a>(&'a self, convoy: &'a str, _cancel: &'a CancellationToken) -> DispatchFuture<'a, ()> {
        Box::pin(async move {
            self.checks.lock().unwrap().push(convoy.to_string());
            if let Some(store) = &self.store {
                check_convoy(store.as_ref(), convoy).await?;
            }
            Ok(())
        })
    }
}
