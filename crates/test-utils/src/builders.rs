use std::collections::BTreeMap;
use std::sync::Arc;

use convoy::routing::{Route, Routes};
use convoy::store::{BackingStore, DepEdge, MemoryStore, NewItem, StoreSet, StoreState};
use convoy::types::{ConvoyStatus, DepType, ItemStatus, ItemType};

/// Builder for a pre-populated `MemoryStore` to simplify test setup.
///
/// Items get their id as title unless one is given. Panics on invalid
/// setup (duplicate ids, edges from unknown items).
pub struct StoreBuilder {
    state: StoreState,
}

impl StoreBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            state: StoreState::new(prefix),
        }
    }

    pub fn item(mut self, id: &str, item_type: ItemType, title: &str) -> Self {
        self.state
            .create(NewItem::new(item_type, title).with_id(id))
            .expect("Failed to create item in builder");
        self
    }

    pub fn task(self, id: &str) -> Self {
        self.item(id, ItemType::Task, id)
    }

    pub fn epic(self, id: &str, title: &str) -> Self {
        self.item(id, ItemType::Epic, title)
    }

    /// An epic with an integration point set.
    pub fn integrated_epic(mut self, id: &str, title: &str, point: &str) -> Self {
        self.state
            .create(
                NewItem::new(ItemType::Epic, title)
                    .with_id(id)
                    .with_integration_point(point),
            )
            .expect("Failed to create epic in builder");
        self
    }

    pub fn status(mut self, id: &str, status: ItemStatus) -> Self {
        self.state
            .set_status(id, status)
            .expect("Failed to set status in builder");
        self
    }

    pub fn assigned(mut self, id: &str, assignee: &str) -> Self {
        self.state
            .set_assignee(id, Some(assignee.to_string()))
            .expect("Failed to set assignee in builder");
        self
    }

    pub fn edge(mut self, source: &str, target: &str, dep_type: DepType) -> Self {
        self.state
            .add_dependency(DepEdge::new(source, target, dep_type))
            .expect("Failed to add edge in builder");
        self
    }

    /// `item` is blocked by `blocker`.
    pub fn blocked_by(self, item: &str, blocker: &str) -> Self {
        self.edge(item, blocker, DepType::Blocks)
    }

    pub fn child_of(self, child: &str, parent: &str) -> Self {
        self.edge(child, parent, DepType::ParentChild)
    }

    /// A convoy tracking `items`. Items may live in another store.
    pub fn convoy(mut self, id: &str, status: ConvoyStatus, items: &[&str]) -> Self {
        self.state
            .create(
                NewItem::new(ItemType::Convoy, format!("convoy {id}"))
                    .with_id(id)
                    .with_status(status.into()),
            )
            .expect("Failed to create convoy in builder");
        for item in items {
            self = self.edge(id, item, DepType::Tracks);
        }
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore::from_state(self.state)
    }

    pub fn build_arc(self) -> Arc<MemoryStore> {
        Arc::new(self.build())
    }
}

/// Routes from `(prefix, store, target)` triples.
pub fn routes(home: &str, entries: &[(&str, &str, Option<&str>)], paused: &[&str]) -> Routes {
    Routes::new(
        home,
        entries
            .iter()
            .map(|(prefix, store, target)| Route {
                prefix: prefix.to_string(),
                store: store.to_string(),
                target: target.map(str::to_string),
            })
            .collect(),
        paused.iter().map(|p| p.to_string()),
    )
}

/// A routed view over named memory stores.
pub fn store_set(stores: &[(&str, &Arc<MemoryStore>)], routes: Routes) -> StoreSet {
    let map: BTreeMap<String, Arc<dyn BackingStore>> = stores
        .iter()
        .map(|(name, store)| (name.to_string(), Arc::clone(*store) as Arc<dyn BackingStore>))
        .collect();
    StoreSet::new(map, routes)
}
