//! Normalized entity storage: an ordered id list plus an id → entity map.
//!
//! # Invariant
//!
//! `id_list` and the keys of `entity_map` always hold the same set of ids and
//! `id_list` never contains duplicates. Every mutation below preserves this;
//! there is no way to reach either half independently.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::id::{Entity, EntityId};

/// An ordered, de-duplicated set of entities keyed by [`EntityId`].
#[derive(Debug, Clone)]
pub struct EntityCollection<T> {
    id_list: Vec<EntityId>,
    entity_map: HashMap<EntityId, T>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self {
            id_list: Vec::new(),
            entity_map: HashMap::new(),
        }
    }
}

impl<T> EntityCollection<T> {
    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_list.len()
    }

    /// Whether the collection holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_list.is_empty()
    }
}

impl<T: Entity> EntityCollection<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from entities in iteration order.
    ///
    /// A later entity with an already-seen id replaces the earlier value but
    /// keeps the earlier position.
    pub fn from_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let mut collection = Self::new();
        collection.upsert_many(entities);
        collection
    }

    /// Replaces the whole set.
    pub fn set_all(&mut self, entities: impl IntoIterator<Item = T>) {
        self.id_list.clear();
        self.entity_map.clear();
        self.upsert_many(entities);
    }

    /// Inserts or replaces a single entity. New ids are appended at the end.
    ///
    /// Returns `true` if the id was not present before.
    pub fn upsert(&mut self, entity: T) -> bool {
        let id = entity.id();
        if self.entity_map.insert(id.clone(), entity).is_none() {
            self.id_list.push(id);
            true
        } else {
            false
        }
    }

    /// Upserts every entity, returning how many ids were newly added.
    pub fn upsert_many(&mut self, entities: impl IntoIterator<Item = T>) -> usize {
        entities
            .into_iter()
            .map(|entity| usize::from(self.upsert(entity)))
            .sum()
    }

    /// Removes an entity by id.
    pub fn remove(&mut self, id: &EntityId) -> Option<T> {
        let removed = self.entity_map.remove(id)?;
        self.id_list.retain(|existing| existing != id);
        Some(removed)
    }

    /// Removes every listed id, returning how many were present.
    pub fn remove_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a EntityId>) -> usize {
        let doomed: HashSet<&EntityId> = ids
            .into_iter()
            .filter(|id| self.entity_map.contains_key(*id))
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        for id in &doomed {
            self.entity_map.remove(*id);
        }
        self.id_list.retain(|id| !doomed.contains(id));
        doomed.len()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.id_list.clear();
        self.entity_map.clear();
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.entity_map.get(id)
    }

    /// Whether `id` is part of the collection.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entity_map.contains_key(id)
    }

    /// Ids in collection order.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.id_list
    }

    /// Iterates entities in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.id_list.iter().filter_map(|id| self.entity_map.get(id))
    }

    /// Clones entities in collection order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Stable-sorts the id list with a comparator over entities.
    ///
    /// Entities comparing equal keep their previous relative order.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        let map = &self.entity_map;
        self.id_list.sort_by(|a, b| match (map.get(a), map.get(b)) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        });
    }

    /// Reorders the id list to `order`.
    ///
    /// Ids in `order` that are unknown are skipped; known ids missing from
    /// `order` keep their relative order and go to the end.
    pub fn reorder(&mut self, order: &[EntityId]) {
        let mut seen = HashSet::with_capacity(self.id_list.len());
        let mut next = Vec::with_capacity(self.id_list.len());
        for id in order {
            if self.entity_map.contains_key(id) && seen.insert(id.clone()) {
                next.push(id.clone());
            }
        }
        for id in &self.id_list {
            if !seen.contains(id) {
                next.push(id.clone());
            }
        }
        self.id_list = next;
    }
}
