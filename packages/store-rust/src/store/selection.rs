//! Selection operations. The aggregate is always computed against the
//! visible (post-filter) ids.

use tessera_core::{AllSelected, Entity, EntityId, FilterValue, SelectionState};

use super::CollectionStore;

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Selects one entity. Replaces the selection in single mode.
    pub fn select_entity(&self, id: EntityId) {
        self.shared.state.update(|s| s.selection.select(id));
    }

    /// Deselects one entity.
    pub fn deselect_entity(&self, id: &EntityId) {
        self.shared.state.update(|s| s.selection.deselect(id));
    }

    /// Flips one entity's selection.
    pub fn toggle_select_entity(&self, id: EntityId) {
        self.shared.state.update(|s| s.selection.toggle(id));
    }

    /// Selects every listed entity.
    pub fn select_entities(&self, ids: impl IntoIterator<Item = EntityId>) {
        self.shared.state.update(|s| s.selection.select_many(ids));
    }

    /// Deselects every listed entity.
    pub fn deselect_entities(&self, ids: &[EntityId]) {
        self.shared.state.update(|s| s.selection.deselect_many(ids));
    }

    /// Flips each listed entity independently.
    pub fn toggle_select_entities(&self, ids: impl IntoIterator<Item = EntityId>) {
        self.shared.state.update(|s| s.selection.toggle_many(ids));
    }

    /// Selects every visible entity, or deselects them all if they already
    /// are. Multi mode only.
    pub fn toggle_select_all_entities(&self) {
        self.shared.state.update(|s| {
            let visible: Vec<EntityId> = self.shared.visible(s).iter().map(Entity::id).collect();
            s.selection.toggle_all(&visible);
        });
    }

    /// Clears the selection.
    pub fn clear_selection(&self) {
        self.shared.state.update(|s| s.selection.clear());
    }

    /// `None`, `Some` or `All` of the visible entities are selected.
    #[must_use]
    pub fn is_all_entities_selected(&self) -> AllSelected {
        self.shared.state.with(|s| {
            let visible: Vec<EntityId> = self.shared.visible(s).iter().map(Entity::id).collect();
            s.selection.all_selected(&visible)
        })
    }

    /// The selected id in single mode.
    #[must_use]
    pub fn selected_id(&self) -> Option<EntityId> {
        self.shared.state.with(|s| match &s.selection {
            SelectionState::Single { selected_id } => selected_id.clone(),
            _ => None,
        })
    }

    /// The selected entity in single mode, if resident.
    #[must_use]
    pub fn selected_entity(&self) -> Option<T> {
        let id = self.selected_id()?;
        self.entity(&id)
    }

    /// Every selected id, in id order.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<EntityId> {
        self.shared.state.with(|s| s.selection.selected_ids())
    }

    /// Every selected entity that is resident, in collection order.
    #[must_use]
    pub fn selected_entities(&self) -> Vec<T> {
        self.shared.state.with(|s| {
            s.entities
                .iter()
                .filter(|entity| s.selection.is_selected(&entity.id()))
                .cloned()
                .collect()
        })
    }
}
