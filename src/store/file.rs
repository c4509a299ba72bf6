// src/store/file.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::{ConvoyError, Result};
use crate::fs::FileSystem;
use crate::store::{
    DepEdge, EventLog, ItemFilter, NewItem, StoreEvent, StoreFuture, StoreState, WorkItem,
    WorkStore,
};
use crate::types::ItemStatus;

/// Store persisted as a single JSON [`StoreState`] document.
///
/// Every read loads the file, every mutation rewrites it. This is a
/// reference collaborator for the CLI, not a storage engine: it trades
/// throughput for having the daemon and one-shot commands see the same data.
///
/// File I/O runs on the blocking pool. The returned futures do nothing until
/// polled, so a caller's timeout can abandon a slow read.
pub struct FileStore {
    inner: Arc<StoreFile>,
}

struct StoreFile {
    path: PathBuf,
    prefix: String,
    fs: Arc<dyn FileSystem>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.path)
            .field("prefix", &self.inner.prefix)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Open a store, creating an empty one on first write if the file is missing.
    pub fn open(path: impl Into<PathBuf>, prefix: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            inner: Arc::new(StoreFile {
                path: path.into(),
                prefix: prefix.into(),
                fs,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Open a store only if its file already exists.
    ///
    /// Used for lazy acquisition: a store whose file has not appeared yet is
    /// "not ready" rather than empty.
    pub fn open_existing(
        path: impl Into<PathBuf>,
        prefix: impl Into<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let path = path.into();
        if !fs.exists(&path) {
            return Err(ConvoyError::Store(format!(
                "store file {} does not exist yet",
                path.display()
            )));
        }
        Ok(Self::open(path, prefix, fs))
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T + Send + 'static) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
    {
        let file = Arc::clone(&self.inner);
        Box::pin(async move {
            blocking(move || {
                let state = file.load()?;
                Ok(f(&state))
            })
            .await
        })
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T> + Send + 'static,
    ) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
    {
        let file = Arc::clone(&self.inner);
        Box::pin(async move {
            blocking(move || {
                let _guard = file.write_lock.lock().unwrap_or_else(|e| e.into_inner());
                let mut state = file.load()?;
                let out = f(&mut state)?;
                file.save(&state)?;
                Ok(out)
            })
            .await
        })
    }
}

impl StoreFile {
    fn load(&self) -> Result<StoreState> {
        if !self.fs.exists(&self.path) {
            return Ok(StoreState::new(self.prefix.clone()));
        }
        let contents = self.fs.read_to_string(&self.path)?;
        let state: StoreState = serde_json::from_str(&contents)?;
        Ok(state)
    }

    fn save(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        self.fs.write(&self.path, &json)?;
        debug!(path = %self.path.display(), items = state.items.len(), "store file written");
        Ok(())
    }
}

async fn blocking<T>(job: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ConvoyError::Store(format!("store file task failed: {e}")))?
}

impl WorkStore for FileStore {
    fn get(&self, id: &str) -> StoreFuture<'_, Option<WorkItem>> {
        let id = id.to_string();
        self.read(move |s| s.get(&id))
    }

    fn create(&self, item: NewItem) -> StoreFuture<'_, WorkItem> {
        self.mutate(move |s| s.create(item))
    }

    fn set_status(&self, id: &str, status: ItemStatus) -> StoreFuture<'_, ()> {
        let id = id.to_string();
        self.mutate(move |s| s.set_status(&id, status))
    }

    fn add_dependency(&self, edge: DepEdge) -> StoreFuture<'_, ()> {
        self.mutate(move |s| s.add_dependency(edge))
    }

    fn dependencies_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        let id = id.to_string();
        self.read(move |s| s.dependencies_of(&id))
    }

    fn dependents_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        let id = id.to_string();
        self.read(move |s| s.dependents_of(&id))
    }

    fn list(&self, filter: ItemFilter) -> StoreFuture<'_, Vec<WorkItem>> {
        self.read(move |s| s.list(&filter))
    }
}

impl EventLog for FileStore {
    fn events_since(&self, after: u64) -> StoreFuture<'_, Vec<StoreEvent>> {
        self.read(move |s| s.events_since(after))
    }
}
