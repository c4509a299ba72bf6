// src/store/memory.rs

use std::future::ready;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::{ConvoyError, Result};
use crate::store::{
    DepEdge, EventKind, EventLog, ItemFilter, NewItem, StoreEvent, StoreFuture, StoreState,
    WorkItem, WorkStore,
};
use crate::types::ItemStatus;

/// In-process store holding a [`StoreState`] behind a mutex.
///
/// `set_unavailable(true)` makes every operation fail, which lets tests
/// simulate a backing service that disappears and comes back mid-run.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(StoreState::new(prefix)),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Wrap a pre-populated state.
    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Append a raw event, e.g. to replay a close delivered by a replica.
    pub fn push_event(&self, kind: EventKind, item_id: &str, new_value: Option<&str>) -> u64 {
        let mut state = self.lock();
        state.push_event(kind, item_id, new_value.map(str::to_string))
    }

    pub fn set_assignee(&self, id: &str, assignee: Option<&str>) -> Result<()> {
        self.with_state(|s| s.set_assignee(id, assignee.map(str::to_string)))
    }

    /// Highest event ordinal recorded so far.
    pub fn last_ordinal(&self) -> u64 {
        self.lock().events.last().map(|e| e.ordinal).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // A poisoned lock only means another test thread panicked mid-update;
        // the state itself is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConvoyError::Store("memory store unavailable".to_string()));
        }
        let mut state = self.lock();
        f(&mut state)
    }
}

impl WorkStore for MemoryStore {
    fn get(&self, id: &str) -> StoreFuture<'_, Option<WorkItem>> {
        Box::pin(ready(self.with_state(|s| Ok(s.get(id)))))
    }

    fn create(&self, item: NewItem) -> StoreFuture<'_, WorkItem> {
        Box::pin(ready(self.with_state(|s| s.create(item))))
    }

    fn set_status(&self, id: &str, status: ItemStatus) -> StoreFuture<'_, ()> {
        Box::pin(ready(self.with_state(|s| s.set_status(id, status))))
    }

    fn add_dependency(&self, edge: DepEdge) -> StoreFuture<'_, ()> {
        Box::pin(ready(self.with_state(|s| s.add_dependency(edge))))
    }

    fn dependencies_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        Box::pin(ready(self.with_state(|s| Ok(s.dependencies_of(id)))))
    }

    fn dependents_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        Box::pin(ready(self.with_state(|s| Ok(s.dependents_of(id)))))
    }

    fn list(&self, filter: ItemFilter) -> StoreFuture<'_, Vec<WorkItem>> {
        Box::pin(ready(self.with_state(|s| Ok(s.list(&filter)))))
    }
}

impl EventLog for MemoryStore {
    fn events_since(&self, after: u64) -> StoreFuture<'_, Vec<StoreEvent>> {
        Box::pin(ready(self.with_state(|s| Ok(s.events_since(after)))))
    }
}
