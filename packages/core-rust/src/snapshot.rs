//! Serialized collection snapshot for web-storage style persistence.
//!
//! Layout: `{entityMap, idList, callStatus, ...extras}` where the extras
//! (filter, sort, paging position, selection) are included per
//! [`SnapshotFields`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::call_status::CallStatus;
use crate::id::{Entity, EntityId};
use crate::selection::SelectionState;
use crate::sort::Sort;
use crate::state::CollectionState;

/// Which parts of the state a snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFields {
    /// Entities and their order.
    pub entities: bool,
    /// Current filter.
    pub filter: bool,
    /// Active sort.
    pub sort: bool,
    /// Page index and size.
    pub pagination: bool,
    /// Selection.
    pub selection: bool,
}

impl Default for SnapshotFields {
    fn default() -> Self {
        Self {
            entities: true,
            filter: true,
            sort: true,
            pagination: true,
            selection: true,
        }
    }
}

/// A persisted collection snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(
        serialize = "T: Serialize, F: Serialize",
        deserialize = "T: DeserializeOwned, F: DeserializeOwned"
    )
)]
pub struct StorageSnapshot<T, F> {
    /// Entities keyed by the string form of their id.
    #[serde(default)]
    pub entity_map: BTreeMap<String, T>,
    /// Entity order.
    #[serde(default)]
    pub id_list: Vec<EntityId>,
    /// Call status at capture time.
    #[serde(default)]
    pub call_status: CallStatus,
    /// Filter value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<F>,
    /// Active sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    /// Zero-based page index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_index: Option<usize>,
    /// Rows per page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    /// Selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionState>,
}

impl<T: Entity, F: Clone> StorageSnapshot<T, F> {
    /// Captures the selected parts of `state`.
    #[must_use]
    pub fn capture(state: &CollectionState<T, F>, fields: SnapshotFields) -> Self {
        let (entity_map, id_list) = if fields.entities {
            (
                state
                    .entities
                    .iter()
                    .map(|entity| (entity.id().to_string(), entity.clone()))
                    .collect(),
                state.entities.ids().to_vec(),
            )
        } else {
            (BTreeMap::new(), Vec::new())
        };
        Self {
            entity_map,
            id_list,
            call_status: state.call_status.clone(),
            filter: fields.filter.then(|| state.filter.clone()),
            sort: if fields.sort { state.sort.clone() } else { None },
            page_index: fields.pagination.then(|| state.paging.page_index()),
            page_size: if fields.pagination {
                state.paging.page_size()
            } else {
                None
            },
            selection: fields.selection.then(|| state.selection.clone()),
        }
    }

    /// Entities in `id_list` order; ids without a map entry are skipped.
    #[must_use]
    pub fn entities(&self) -> Vec<T> {
        self.id_list
            .iter()
            .filter_map(|id| self.entity_map.get(&id.to_string()).cloned())
            .collect()
    }
}
