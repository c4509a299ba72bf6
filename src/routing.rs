// src/routing.rs

//! Id-prefix routing.
//!
//! Work-item ids carry a prefix (`gt-abc`, `bd-12`, `hq-cv-3`). The prefix
//! decides which backing store owns the item and which target environment
//! an item is dispatched to. Longest prefix wins.

use std::collections::BTreeSet;

use serde::Serialize;

/// One prefix route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    /// Name of the backing store owning ids with this prefix.
    pub store: String,
    /// Execution environment items with this prefix are dispatched to.
    /// `None` means the items are not dispatchable anywhere.
    pub target: Option<String>,
}

/// A resolved dispatch target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub paused: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Routes {
    home_store: String,
    /// Sorted longest prefix first.
    routes: Vec<Route>,
    paused_targets: BTreeSet<String>,
}

impl Routes {
    pub fn new(
        home_store: impl Into<String>,
        mut routes: Vec<Route>,
        paused_targets: impl IntoIterator<Item = String>,
    ) -> Self {
        routes.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        Self {
            home_store: home_store.into(),
            routes,
            paused_targets: paused_targets.into_iter().collect(),
        }
    }

    /// Store that holds convoys and any id no route claims.
    pub fn home_store(&self) -> &str {
        &self.home_store
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route_for(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| id.starts_with(r.prefix.as_str()))
    }

    pub fn store_for(&self, id: &str) -> &str {
        self.route_for(id)
            .map(|r| r.store.as_str())
            .unwrap_or(self.home_store.as_str())
    }

    /// Resolve the target environment for an item, if it has one.
    pub fn target_for(&self, id: &str) -> Option<Target> {
        let name = self.route_for(id)?.target.clone()?;
        let paused = self.paused_targets.contains(&name);
        Some(Target { name, paused })
    }

    pub fn is_paused(&self, target: &str) -> bool {
        self.paused_targets.contains(target)
    }

    pub fn set_paused(&mut self, target: impl Into<String>, paused: bool) {
        let target = target.into();
        if paused {
            self.paused_targets.insert(target);
        } else {
            self.paused_targets.remove(&target);
        }
    }
}
