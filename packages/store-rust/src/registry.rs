//! Multi-collection host.
//!
//! Each registered store keeps its own state and call status; the registry
//! only maps collection names to stores.

use std::any::Any;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tessera_core::{Entity, FilterValue};

use crate::error::StoreError;
use crate::store::CollectionStore;

// ---------------------------------------------------------------------------
// CollectionRegistry
// ---------------------------------------------------------------------------

/// Registry of independent collection stores keyed by collection name.
///
/// Lookups are typed: a store registered as `CollectionStore<T, F>` is only
/// returned for the same `T` and `F`.
pub struct CollectionRegistry {
    by_name: DashMap<String, Arc<dyn Any + Send + Sync>>,
    order: RwLock<Vec<String>>,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a store under its collection name.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnnamedCollection`] if the store was built without a
    /// collection name; [`StoreError::DuplicateCollection`] if the name is
    /// taken.
    pub fn register<T: Entity, F: FilterValue>(
        &self,
        store: CollectionStore<T, F>,
    ) -> Result<(), StoreError> {
        let name = store
            .collection()
            .ok_or(StoreError::UnnamedCollection)?
            .to_string();
        match self.by_name.entry(name.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateCollection { name }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(store));
                self.order.write().push(name);
                Ok(())
            }
        }
    }

    /// Looks up a store by name and type.
    #[must_use]
    pub fn get<T: Entity, F: FilterValue>(&self, name: &str) -> Option<CollectionStore<T, F>> {
        self.by_name
            .get(name)
            .and_then(|entry| entry.value().clone().downcast::<CollectionStore<T, F>>().ok())
            .map(|store| (*store).clone())
    }

    /// Whether a store is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Unregisters a store. Returns whether one was registered.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.by_name.remove(name).is_some();
        if removed {
            self.order.write().retain(|existing| existing != name);
        }
        removed
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
