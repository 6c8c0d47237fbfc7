//! Single and multi selection over entity ids.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Aggregate selection state over a set of visible ids. Always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllSelected {
    /// No visible id is selected (or nothing is visible).
    None,
    /// Some but not all visible ids are selected.
    Some,
    /// Every visible id is selected.
    All,
}

/// Selection model of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum SelectionState {
    /// Selection is not enabled; every operation is a no-op.
    #[default]
    Disabled,
    /// At most one selected id.
    #[serde(rename_all = "camelCase")]
    Single {
        /// Currently selected id.
        selected_id: Option<EntityId>,
    },
    /// Any number of selected ids.
    #[serde(rename_all = "camelCase")]
    Multi {
        /// Selected ids; presence means selected.
        selected_ids: BTreeSet<EntityId>,
    },
}

impl SelectionState {
    /// Empty single selection.
    #[must_use]
    pub fn single() -> Self {
        Self::Single { selected_id: None }
    }

    /// Empty multi selection.
    #[must_use]
    pub fn multi() -> Self {
        Self::Multi {
            selected_ids: BTreeSet::new(),
        }
    }

    /// Selects `id`. In single mode this replaces the previous selection.
    pub fn select(&mut self, id: EntityId) {
        match self {
            Self::Disabled => {}
            Self::Single { selected_id } => *selected_id = Some(id),
            Self::Multi { selected_ids } => {
                selected_ids.insert(id);
            }
        }
    }

    /// Selects every id. In single mode the last id wins.
    pub fn select_many(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        for id in ids {
            self.select(id);
        }
    }

    /// Deselects `id` if it is selected.
    pub fn deselect(&mut self, id: &EntityId) {
        match self {
            Self::Disabled => {}
            Self::Single { selected_id } => {
                if selected_id.as_ref() == Some(id) {
                    *selected_id = None;
                }
            }
            Self::Multi { selected_ids } => {
                selected_ids.remove(id);
            }
        }
    }

    /// Deselects every listed id.
    pub fn deselect_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a EntityId>) {
        for id in ids {
            self.deselect(id);
        }
    }

    /// Flips the selection of `id`.
    pub fn toggle(&mut self, id: EntityId) {
        if self.is_selected(&id) {
            self.deselect(&id);
        } else {
            self.select(id);
        }
    }

    /// Flips the selection of each listed id independently.
    pub fn toggle_many(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        for id in ids {
            self.toggle(id);
        }
    }

    /// Clears the selection, keeping the mode.
    pub fn clear(&mut self) {
        match self {
            Self::Disabled => {}
            Self::Single { selected_id } => *selected_id = None,
            Self::Multi { selected_ids } => selected_ids.clear(),
        }
    }

    /// Whether `id` is selected.
    #[must_use]
    pub fn is_selected(&self, id: &EntityId) -> bool {
        match self {
            Self::Disabled => false,
            Self::Single { selected_id } => selected_id.as_ref() == Some(id),
            Self::Multi { selected_ids } => selected_ids.contains(id),
        }
    }

    /// Whether nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Disabled => true,
            Self::Single { selected_id } => selected_id.is_none(),
            Self::Multi { selected_ids } => selected_ids.is_empty(),
        }
    }

    /// Selected ids in id order.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<EntityId> {
        match self {
            Self::Disabled => Vec::new(),
            Self::Single { selected_id } => selected_id.iter().cloned().collect(),
            Self::Multi { selected_ids } => selected_ids.iter().cloned().collect(),
        }
    }

    /// Drops selected ids for which `keep` returns `false`.
    pub fn retain(&mut self, mut keep: impl FnMut(&EntityId) -> bool) {
        match self {
            Self::Disabled => {}
            Self::Single { selected_id } => {
                if selected_id.as_ref().is_some_and(|id| !keep(id)) {
                    *selected_id = None;
                }
            }
            Self::Multi { selected_ids } => selected_ids.retain(|id| keep(id)),
        }
    }

    /// Tri-state aggregate against the `visible` ids.
    #[must_use]
    pub fn all_selected(&self, visible: &[EntityId]) -> AllSelected {
        let selected = visible.iter().filter(|id| self.is_selected(id)).count();
        if selected == 0 {
            AllSelected::None
        } else if selected == visible.len() {
            AllSelected::All
        } else {
            AllSelected::Some
        }
    }

    /// Deselects all `visible` ids if all are selected, else selects them all.
    ///
    /// Only meaningful in multi mode.
    pub fn toggle_all(&mut self, visible: &[EntityId]) {
        if !matches!(self, Self::Multi { .. }) {
            return;
        }
        if self.all_selected(visible) == AllSelected::All {
            self.deselect_many(visible);
        } else {
            self.select_many(visible.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<EntityId> {
        range.map(EntityId::Num).collect()
    }

    #[test]
    fn single_selection_replaces() {
        let mut selection = SelectionState::single();
        selection.select(EntityId::Num(1));
        selection.select(EntityId::Num(2));
        assert_eq!(selection.selected_ids(), vec![EntityId::Num(2)]);
        selection.deselect(&EntityId::Num(1));
        assert!(selection.is_selected(&EntityId::Num(2)));
        selection.toggle(EntityId::Num(2));
        assert!(selection.is_empty());
    }

    #[test]
    fn multi_toggle_many_flips_each() {
        let mut selection = SelectionState::multi();
        selection.select(EntityId::Num(1));
        selection.toggle_many(ids(1..=3));
        assert_eq!(selection.selected_ids(), ids(2..=3));
    }

    #[test]
    fn tri_state_is_computed_against_visible_ids() {
        let mut selection = SelectionState::multi();
        let visible = ids(1..=3);
        assert_eq!(selection.all_selected(&visible), AllSelected::None);
        selection.select(EntityId::Num(1));
        assert_eq!(selection.all_selected(&visible), AllSelected::Some);
        selection.select_many(ids(2..=3));
        assert_eq!(selection.all_selected(&visible), AllSelected::All);
        // An id selected outside the visible set does not change the aggregate.
        selection.select(EntityId::Num(99));
        assert_eq!(selection.all_selected(&visible), AllSelected::All);
        assert_eq!(selection.all_selected(&[]), AllSelected::None);
    }

    #[test]
    fn toggle_all_selects_then_clears_visible() {
        let mut selection = SelectionState::multi();
        selection.select(EntityId::Num(42));
        let visible = ids(1..=3);
        selection.toggle_all(&visible);
        assert_eq!(selection.all_selected(&visible), AllSelected::All);
        selection.toggle_all(&visible);
        assert_eq!(selection.selected_ids(), vec![EntityId::Num(42)]);
    }

    #[test]
    fn disabled_ignores_everything() {
        let mut selection = SelectionState::Disabled;
        selection.select(EntityId::Num(1));
        selection.toggle_all(&ids(1..=2));
        assert!(selection.is_empty());
    }

    #[test]
    fn retain_prunes_missing_ids() {
        let mut selection = SelectionState::multi();
        selection.select_many(ids(1..=4));
        selection.retain(|id| *id != EntityId::Num(2));
        assert_eq!(selection.selected_ids(), vec![EntityId::Num(1), EntityId::Num(3), EntityId::Num(4)]);
    }

    #[test]
    fn serializes_with_mode_tag() {
        let mut selection = SelectionState::single();
        selection.select(EntityId::Num(7));
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "single", "selectedId": 7 }));
    }
}
