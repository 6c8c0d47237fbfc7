//! The composed collection store.
//!
//! A [`CollectionStore`] owns one collection's [`CollectionState`] in a
//! [`Signal`] and layers the configured features on top of it. Every public
//! operation is a single atomic state update, so subscribers never observe a
//! half-applied change. Fetches, debounce timers and their completions run on
//! the ambient tokio runtime.

mod builder;
mod filter;
mod loading;
mod paging;
mod restore;
mod selection;
mod sort;

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::paging::local_page;
use tessera_core::query_params::QueryParamsState;
use tessera_core::sort::sort_collection;
use tessera_core::{
    CollectionState, Derived, Entity, EntityId, FilterValue, Page, PageInfo, PagingState,
    SelectionState, Signal, SnapshotFields, Sort, StorageSnapshot, Subscription,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::StoreDefaults;
use crate::features::{FilterFeature, SelectionFeature, SortFeature};
use crate::loader::{EntityLoader, LoaderHooks};

pub use builder::CollectionStoreBuilder;

/// A reactive, query-able entity collection.
///
/// Cheap to clone; clones share the same state.
pub struct CollectionStore<T, F> {
    shared: Arc<Shared<T, F>>,
}

impl<T, F> Clone for CollectionStore<T, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct Shared<T, F> {
    state: Signal<CollectionState<T, F>>,
    filter: FilterFeature<T, F>,
    sort: SortFeature,
    selection: SelectionFeature,
    loader: Option<Arc<dyn EntityLoader<T, F>>>,
    hooks: LoaderHooks<T>,
    defaults: StoreDefaults,
    collection: Option<String>,
    runtime: Mutex<Runtime<F>>,
    default_applied: AtomicBool,
    settled: Notify,
}

/// Process-local bookkeeping that is not part of the observable state.
///
/// Lock order: the state write lock may be held while taking this lock,
/// never the other way around.
struct Runtime<F> {
    in_flight: bool,
    reload_requested: bool,
    filter_timer: Option<JoinHandle<()>>,
    pending_filter: Option<PendingFilter<F>>,
    next_token: u64,
}

impl<F> Default for Runtime<F> {
    fn default() -> Self {
        Self {
            in_flight: false,
            reload_requested: false,
            filter_timer: None,
            pending_filter: None,
            next_token: 0,
        }
    }
}

struct PendingFilter<F> {
    token: u64,
    value: F,
}

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> CollectionStoreBuilder<T, F> {
        CollectionStoreBuilder::new()
    }

    /// Collection namespace, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.shared.collection.as_deref()
    }

    /// Defaults this store was built with.
    #[must_use]
    pub fn defaults(&self) -> &StoreDefaults {
        &self.shared.defaults
    }

    /// A clone of the full state.
    #[must_use]
    pub fn state(&self) -> CollectionState<T, F> {
        self.shared.state.get()
    }

    /// Reads the state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&CollectionState<T, F>) -> R) -> R {
        self.shared.state.with(f)
    }

    /// Registers an effect that runs with the new state after every change.
    pub fn subscribe(
        &self,
        f: impl Fn(&CollectionState<T, F>) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.state.subscribe(f)
    }

    /// A memoized projection of the state.
    pub fn derive<U>(
        &self,
        f: impl Fn(&CollectionState<T, F>) -> U + Send + Sync + 'static,
    ) -> Derived<CollectionState<T, F>, U>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.shared.state.derive(f)
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Every resident entity in collection order, ignoring filters and paging.
    #[must_use]
    pub fn entities(&self) -> Vec<T> {
        self.shared.state.with(|s| s.entities.to_vec())
    }

    /// Looks up a resident entity.
    #[must_use]
    pub fn entity(&self, id: &EntityId) -> Option<T> {
        self.shared.state.with(|s| s.entities.get(id).cloned())
    }

    /// Entities passing the local filter, in display order.
    ///
    /// For remote paging these are the current page's rows; for infinite
    /// scroll, the buffered window.
    #[must_use]
    pub fn visible_entities(&self) -> Vec<T> {
        self.shared.state.with(|s| self.shared.visible(s))
    }

    /// Ids of [`visible_entities`](Self::visible_entities).
    #[must_use]
    pub fn visible_ids(&self) -> Vec<EntityId> {
        self.shared
            .state
            .with(|s| self.shared.visible(s).iter().map(Entity::id).collect())
    }

    /// Entity at an absolute position.
    ///
    /// In scroll mode the index counts from the first row of the result set
    /// and only buffered rows resolve; otherwise it indexes the visible list.
    #[must_use]
    pub fn entity_at(&self, index: usize) -> Option<T> {
        self.shared.state.with(|s| match &s.paging {
            PagingState::Scroll(window) => window
                .id_at(index)
                .and_then(|id| s.entities.get(id))
                .cloned(),
            _ => self.shared.visible(s).into_iter().nth(index),
        })
    }

    /// Replaces every entity.
    pub fn set_all_entities(&self, entities: impl IntoIterator<Item = T>) {
        let entities: Vec<T> = entities.into_iter().collect();
        self.shared.state.update(|s| {
            s.entities.set_all(entities);
            prune_selection(s);
            self.shared.entities_changed(s);
        });
    }

    /// Inserts or replaces entities by id. Returns how many were new.
    pub fn upsert_entities(&self, entities: impl IntoIterator<Item = T>) -> usize {
        let entities: Vec<T> = entities.into_iter().collect();
        self.shared.state.update(|s| {
            let added = s.entities.upsert_many(entities);
            self.shared.entities_changed(s);
            added
        })
    }

    /// Removes entities by id and deselects them. Returns how many existed.
    pub fn remove_entities(&self, ids: &[EntityId]) -> usize {
        self.shared.state.update(|s| {
            let removed = s.entities.remove_many(ids);
            s.selection.deselect_many(ids);
            removed
        })
    }

    /// Removes every entity and clears the selection.
    pub fn clear_entities(&self) {
        self.shared.state.update(|s| {
            s.entities.clear();
            s.selection.clear();
        });
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Entities and flags of the current page.
    #[must_use]
    pub fn current_page(&self) -> Page<T> {
        self.shared.state.with(|s| {
            let visible = self.shared.visible(s);
            match &s.paging {
                PagingState::Disabled => {
                    let total = visible.len();
                    Page {
                        entities: visible,
                        info: PageInfo::new(0, total, total),
                    }
                }
                PagingState::Local {
                    page_index,
                    page_size,
                } => Page {
                    info: PageInfo::new(*page_index, *page_size, visible.len()),
                    entities: local_page(&visible, *page_index, *page_size),
                },
                PagingState::Remote(paged) => Page {
                    entities: visible,
                    info: paged.info(),
                },
                PagingState::Scroll(window) => {
                    let total = window.end();
                    let mut info = PageInfo::new(window.current_page, window.page_size, total);
                    info.has_next = info.has_next || window.has_more;
                    Page {
                        entities: visible,
                        info,
                    }
                }
            }
        })
    }

    /// Flags of the current page.
    #[must_use]
    pub fn page_info(&self) -> PageInfo {
        self.current_page().info
    }

    /// The filter value most recently stored.
    #[must_use]
    pub fn current_filter(&self) -> F {
        self.shared.state.with(|s| s.filter.clone())
    }

    /// The active sort.
    #[must_use]
    pub fn current_sort(&self) -> Option<Sort> {
        self.shared.state.with(|s| s.sort.clone())
    }

    /// Whether the scroll window can still grow. Always `false` outside
    /// scroll mode.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.shared.state.with(|s| match &s.paging {
            PagingState::Scroll(window) => window.has_more,
            _ => false,
        })
    }

    /// Absolute index range held by the scroll window.
    #[must_use]
    pub fn window_range(&self) -> Option<Range<usize>> {
        self.shared.state.with(|s| match &s.paging {
            PagingState::Scroll(window) => Some(window.start()..window.end()),
            _ => None,
        })
    }

    /// Current query as URL-mappable state.
    #[must_use]
    pub fn query_state(&self) -> QueryParamsState<F> {
        self.shared.state.with(query_state_of)
    }

    /// Captures the selected parts of the state.
    #[must_use]
    pub fn snapshot(&self, fields: SnapshotFields) -> StorageSnapshot<T, F> {
        self.shared
            .state
            .with(|s| StorageSnapshot::capture(s, fields))
    }
}

impl<T: Entity, F: FilterValue> Shared<T, F> {
    /// Entities passing the local predicate, in display order.
    fn visible(&self, s: &CollectionState<T, F>) -> Vec<T> {
        let predicate = self.filter.predicate();
        let passes = |entity: &&T| predicate.map_or(true, |f| f(*entity, &s.applied_filter));
        match &s.paging {
            PagingState::Scroll(window) => window
                .ids()
                .filter_map(|id| s.entities.get(id))
                .filter(passes)
                .cloned()
                .collect(),
            _ => s.entities.iter().filter(passes).cloned().collect(),
        }
    }

    /// Re-applies the local sort and the default selection after a write.
    fn entities_changed(&self, s: &mut CollectionState<T, F>) {
        if !self.sort.is_remote() && !matches!(s.paging, PagingState::Scroll(_)) {
            if let Some(sort) = s.sort.clone() {
                sort_collection(&mut s.entities, &sort);
            }
        }
        if s.entities.is_empty() {
            return;
        }
        if let Some(id) = &self.selection.default_selected_id {
            if s.entities.contains(id) && !self.default_applied.swap(true, Ordering::AcqRel) {
                s.selection.select(id.clone());
            }
        }
    }
}

impl<T: Entity, F: FilterValue> Shared<T, F> {
    /// Moves remote paging back to page 0 while keeping the page cache.
    ///
    /// Page 0 is served from the cache when present; otherwise the rows are
    /// cleared and `true` is returned so the caller fetches it.
    fn rewind_remote_page(&self, s: &mut CollectionState<T, F>) -> bool {
        let PagingState::Remote(paged) = &mut s.paging else {
            return false;
        };
        if paged.page_index == 0 {
            return false;
        }
        paged.page_index = 0;
        let rows = paged.cache.get(0).map(<[T]>::to_vec);
        s.generation += 1;
        match rows {
            Some(rows) => {
                s.entities.set_all(rows);
                self.entities_changed(s);
                false
            }
            None => {
                s.entities.clear();
                true
            }
        }
    }
}

/// The URL-mappable part of `s`.
pub(crate) fn query_state_of<T, F: Clone>(s: &CollectionState<T, F>) -> QueryParamsState<F> {
    QueryParamsState {
        filter: Some(s.filter.clone()),
        sort: s.sort.clone(),
        page_index: Some(s.paging.page_index()),
        selected_id: match &s.selection {
            SelectionState::Single { selected_id } => selected_id.clone(),
            _ => None,
        },
    }
}

/// Drops selected ids that are no longer resident.
fn prune_selection<T: Entity, F>(s: &mut CollectionState<T, F>) {
    let entities = &s.entities;
    s.selection.retain(|id| entities.contains(id));
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use tessera_core::AllSelected;

    use super::*;
    use crate::features::PaginationFeature;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: i64,
        name: String,
        price: u32,
    }

    impl Entity for Row {
        fn id(&self) -> EntityId {
            EntityId::Num(self.id)
        }
    }

    fn rows(count: i64) -> Vec<Row> {
        (0..count)
            .map(|id| Row {
                id,
                name: format!("row {id}"),
                price: u32::try_from(id % 3).unwrap(),
            })
            .collect()
    }

    #[test]
    fn local_pages_slice_the_visible_set() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .pagination(PaginationFeature::local(10))
            .build();
        store.set_all_entities(rows(25));

        let first = store.current_page();
        assert_eq!(first.entities.len(), 10);
        assert_eq!(first.info.pages_count, 3);
        assert!(first.info.has_next);

        store.load_entities_page(2);
        let last = store.current_page();
        assert_eq!(
            last.entities.iter().map(|r| r.id).collect::<Vec<_>>(),
            (20..25).collect::<Vec<_>>()
        );
        assert!(!last.info.has_next);
        assert!(last.info.has_previous);
    }

    #[test]
    fn upsert_keeps_local_sort() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .sort(SortFeature::local(Some(Sort::desc("id"))))
            .build();
        store.set_all_entities(rows(3));
        store.upsert_entities(vec![Row {
            id: 7,
            name: "late".into(),
            price: 0,
        }]);
        let ids: Vec<i64> = store.entities().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 2, 1, 0]);
    }

    #[test]
    fn removing_entities_deselects_them() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .selection(SelectionFeature::multi())
            .build();
        store.set_all_entities(rows(4));
        store.select_entities(vec![EntityId::Num(1), EntityId::Num(2)]);
        assert_eq!(store.remove_entities(&[EntityId::Num(1)]), 1);
        assert_eq!(store.selected_ids(), vec![EntityId::Num(2)]);
        assert_eq!(store.is_all_entities_selected(), AllSelected::Some);
    }

    #[test]
    fn default_selection_applies_once() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .selection(SelectionFeature::single().default_selected_id(1))
            .build();
        assert!(store.selected_id().is_none());
        store.set_all_entities(rows(3));
        assert_eq!(store.selected_id(), Some(EntityId::Num(1)));

        store.deselect_entity(&EntityId::Num(1));
        store.set_all_entities(rows(3));
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn default_selection_waits_for_its_entity() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .selection(SelectionFeature::single().default_selected_id(12))
            .build();
        store.set_all_entities(rows(10));
        assert!(store.selected_id().is_none());
        store.set_all_entities(rows(20));
        assert_eq!(store.selected_id(), Some(EntityId::Num(12)));
    }

    #[test]
    fn subscribers_see_each_write_once() {
        let store: CollectionStore<Row, String> = CollectionStore::builder().build();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = store.subscribe(move |s| sink.lock().push(s.entities.len()));
        store.set_all_entities(rows(2));
        store.upsert_entities(rows(5));
        assert_eq!(*seen.lock(), vec![2, 5]);
    }
}
