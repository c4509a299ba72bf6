// src/store/routed.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::errors::{ConvoyError, Result};
use crate::routing::Routes;
use crate::store::{
    BackingStore, DepEdge, ItemFilter, NewItem, StoreFuture, WorkItem, WorkStore,
};
use crate::types::ItemStatus;

/// Several named backing stores presented as one [`WorkStore`].
///
/// - Item reads/writes go to the store owning the id prefix.
/// - New items (convoys) are created in the home store.
/// - An edge lives with its source item.
/// - `dependents_of` and `list` fan out, because a `tracks` edge from a
///   home-store convoy points at items owned by other stores.
#[derive(Debug, Clone)]
pub struct StoreSet {
    stores: BTreeMap<String, Arc<dyn BackingStore>>,
    routes: Routes,
}

impl StoreSet {
    pub fn new(stores: BTreeMap<String, Arc<dyn BackingStore>>, routes: Routes) -> Self {
        Self { stores, routes }
    }

    /// Convenience for a single store that is also the home store.
    pub fn single(name: impl Into<String>, store: Arc<dyn BackingStore>, routes: Routes) -> Self {
        let mut stores = BTreeMap::new();
        stores.insert(name.into(), store);
        Self::new(stores, routes)
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(|s| s.as_str())
    }

    /// The store owning `id`, if it is currently available.
    pub fn store_for(&self, id: &str) -> Result<Arc<dyn BackingStore>> {
        let name = self.routes.store_for(id);
        self.named(name)
    }

    pub fn named(&self, name: &str) -> Result<Arc<dyn BackingStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| ConvoyError::Store(format!("store '{name}' is not available")))
    }

    fn home(&self) -> Result<Arc<dyn BackingStore>> {
        self.named(self.routes.home_store())
    }

    fn all(&self) -> Vec<(String, Arc<dyn BackingStore>)> {
        self.stores
            .iter()
            .map(|(name, store)| (name.clone(), Arc::clone(store)))
            .collect()
    }
}

impl WorkStore for StoreSet {
    fn get(&self, id: &str) -> StoreFuture<'_, Option<WorkItem>> {
        let id = id.to_string();
        Box::pin(async move { self.store_for(&id)?.get(&id).await })
    }

    fn create(&self, item: NewItem) -> StoreFuture<'_, WorkItem> {
        Box::pin(async move {
            let store = match &item.id {
                Some(id) => self.store_for(id)?,
                None => self.home()?,
            };
            store.create(item).await
        })
    }

    fn set_status(&self, id: &str, status: ItemStatus) -> StoreFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move { self.store_for(&id)?.set_status(&id, status).await })
    }

    fn add_dependency(&self, edge: DepEdge) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.store_for(&edge.source)?.add_dependency(edge).await })
    }

    fn dependencies_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        let id = id.to_string();
        Box::pin(async move { self.store_for(&id)?.dependencies_of(&id).await })
    }

    fn dependents_of(&self, id: &str) -> StoreFuture<'_, Vec<DepEdge>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut merged = Vec::new();
            let mut failures = 0usize;
            let stores = self.all();
            let total = stores.len();

            for (name, store) in stores {
                match store.dependents_of(&id).await {
                    Ok(edges) => merged.extend(edges),
                    Err(e) => {
                        failures += 1;
                        warn!(store = %name, item = %id, error = %e, "dependents lookup failed");
                    }
                }
            }

            if total > 0 && failures == total {
                return Err(ConvoyError::Store(format!(
                    "no store answered dependents lookup for {id}"
                )));
            }

            merged.sort();
            merged.dedup();
            Ok(merged)
        })
    }

    fn list(&self, filter: ItemFilter) -> StoreFuture<'_, Vec<WorkItem>> {
        Box::pin(async move {
            let mut merged: BTreeMap<String, WorkItem> = BTreeMap::new();
            for (name, store) in self.all() {
                match store.list(filter.clone()).await {
                    Ok(items) => {
                        for item in items {
                            merged.insert(item.id.clone(), item);
                        }
                    }
                    Err(e) => warn!(store = %name, error = %e, "list failed; skipping store"),
                }
            }
            Ok(merged.into_values().collect())
        })
    }
}
