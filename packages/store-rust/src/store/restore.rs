//! Applying externally persisted state (URL params, storage snapshots).
//!
//! Restored values that do not fit the store, such as an out-of-range page
//! or a selection of the wrong mode, are ignored rather than applied.

use std::mem::discriminant;

use tessera_core::query_params::QueryParamsState;
use tessera_core::sort::sort_collection;
use tessera_core::{
    CallStatus, CollectionState, Entity, FilterValue, PageInfo, PagingState, StorageSnapshot,
};
use tracing::debug;

use super::{CollectionStore, Shared};

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Applies query state decoded from URL params.
    ///
    /// Filter and sort are stored without debounce. The page is validated
    /// against the visible set (local paging) or the known total (remote
    /// paging). Before the first load, remote modes only record the page so
    /// the initial fetch starts there; afterwards the page is navigated to.
    pub fn restore_query(&self, query: QueryParamsState<F>) {
        let QueryParamsState {
            filter,
            sort,
            page_index,
            selected_id,
        } = query;
        let (reload, navigate) = self.shared.state.update(|s| {
            let mut remote = false;
            if let Some(filter) = filter {
                remote |= filter != s.applied_filter
                    && self.shared.filter.is_remote_change(&s.applied_filter, &filter);
                s.filter = filter.clone();
                s.applied_filter = filter;
            }
            if let Some(sort) = sort {
                if self.shared.sort.is_remote() {
                    remote |= s.sort.as_ref() != Some(&sort);
                } else if !matches!(s.paging, PagingState::Scroll(_)) {
                    sort_collection(&mut s.entities, &sort);
                }
                s.sort = Some(sort);
            }
            if remote {
                let dropped = s.paging.reset(true);
                s.entities.remove_many(&dropped);
                if matches!(s.paging, PagingState::Remote(_)) {
                    s.entities.clear();
                }
                s.generation += 1;
            }
            if let Some(id) = selected_id {
                s.selection.select(id);
            }
            let idle = s.call_status == CallStatus::Idle;
            let navigate = page_index.and_then(|page| self.shared.restore_page(s, page, idle));
            (remote && !idle && navigate.is_none(), navigate)
        });
        if let Some(page) = navigate {
            self.load_entities_page(page);
        } else if reload {
            self.shared.request_reload();
        }
    }

    /// Applies a storage snapshot.
    ///
    /// Entities are restored for every mode except scroll, whose window is
    /// rebuilt by loading. A `Loaded` status is restored with the entities;
    /// other statuses are not.
    pub fn restore_snapshot(&self, snapshot: StorageSnapshot<T, F>) {
        let entities = snapshot.entities();
        let StorageSnapshot {
            id_list,
            call_status,
            filter,
            sort,
            page_index,
            page_size,
            selection,
            ..
        } = snapshot;
        self.shared.state.update(|s| {
            let restore_entities =
                !id_list.is_empty() && !matches!(s.paging, PagingState::Scroll(_));
            if restore_entities {
                s.entities.set_all(entities);
                if call_status.is_loaded() {
                    s.call_status = CallStatus::Loaded;
                }
            }
            if let Some(filter) = filter {
                s.filter = filter.clone();
                s.applied_filter = filter;
            }
            if let Some(sort) = sort {
                s.sort = Some(sort);
            }
            if let Some(selection) = selection {
                if discriminant(&selection) == discriminant(&s.selection) {
                    s.selection = selection;
                } else {
                    debug!(
                        collection = ?self.shared.collection,
                        "ignoring snapshot selection of another mode"
                    );
                }
            }
            match &mut s.paging {
                PagingState::Local {
                    page_size: current, ..
                } => {
                    if let Some(size) = page_size {
                        *current = size.max(1);
                    }
                }
                PagingState::Remote(paged) => {
                    if let Some(size) = page_size {
                        paged.set_page_size(size.max(1));
                    }
                }
                PagingState::Disabled | PagingState::Scroll(_) => {}
            }
            self.shared.entities_changed(s);
            if let Some(page) = page_index {
                self.shared.restore_page(s, page, true);
            }
        });
    }
}

impl<T: Entity, F: FilterValue> Shared<T, F> {
    /// Positions on a restored page. Returns the page when it has to be
    /// navigated to through the normal paging path.
    fn restore_page(
        &self,
        s: &mut CollectionState<T, F>,
        page: usize,
        idle: bool,
    ) -> Option<usize> {
        let visible_len = if matches!(s.paging, PagingState::Local { .. }) {
            self.visible(s).len()
        } else {
            0
        };
        match &mut s.paging {
            PagingState::Disabled => None,
            PagingState::Local {
                page_index,
                page_size,
            } => {
                if PageInfo::is_valid_page(page, *page_size, visible_len) {
                    *page_index = page;
                } else {
                    debug!(collection = ?self.collection, page, "ignoring out-of-range page");
                }
                None
            }
            PagingState::Remote(paged) => {
                if paged
                    .total
                    .is_some_and(|total| !PageInfo::is_valid_page(page, paged.page_size, total))
                {
                    debug!(collection = ?self.collection, page, "ignoring out-of-range page");
                    None
                } else if idle {
                    paged.page_index = page;
                    None
                } else {
                    Some(page)
                }
            }
            PagingState::Scroll(window) => {
                if idle {
                    let dropped = window.restart_at(page);
                    s.entities.remove_many(&dropped);
                    None
                } else {
                    Some(page)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use tessera_core::{EntityId, SelectionState, SnapshotFields, Sort};

    use super::*;
    use crate::features::{FilterFeature, PaginationFeature, SelectionFeature, SortFeature};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: i64,
        title: String,
    }

    impl Entity for Book {
        fn id(&self) -> EntityId {
            EntityId::Num(self.id)
        }
    }

    fn books() -> Vec<Book> {
        (1..=30)
            .map(|id| Book {
                id,
                title: format!("book {id:02}"),
            })
            .collect()
    }

    fn store() -> CollectionStore<Book, String> {
        CollectionStore::builder()
            .filter(FilterFeature::local(|book: &Book, search: &String| {
                book.title.contains(search.as_str())
            }))
            .sort(SortFeature::local(None))
            .pagination(PaginationFeature::local(10))
            .selection(SelectionFeature::single())
            .entities(books())
            .build()
    }

    #[test]
    fn out_of_range_page_is_ignored() {
        let store = store();
        store.restore_query(QueryParamsState {
            page_index: Some(9998),
            ..QueryParamsState::default()
        });
        assert_eq!(store.page_info().page_index, 0);

        store.restore_query(QueryParamsState {
            page_index: Some(2),
            ..QueryParamsState::default()
        });
        assert_eq!(store.page_info().page_index, 2);
    }

    #[test]
    fn page_is_validated_after_the_restored_filter() {
        let store = store();
        store.restore_query(QueryParamsState {
            filter: Some("book 1".to_string()),
            sort: Some(Sort::desc("id")),
            page_index: Some(1),
            selected_id: Some(EntityId::Num(12)),
        });
        assert_eq!(store.current_filter(), "book 1");
        assert_eq!(store.visible_entities().len(), 10);
        assert_eq!(store.page_info().page_index, 0);
        assert_eq!(store.visible_entities()[0].id, 19);
        assert_eq!(store.selected_id(), Some(EntityId::Num(12)));
    }

    #[test]
    fn snapshot_round_trips_into_a_fresh_store() {
        let source = store();
        source.sort_entities(Some(Sort::desc("id")));
        source.load_entities_page(1);
        source.select_entity(EntityId::Num(5));
        source.set_loading();
        source.set_loaded().unwrap();
        let snapshot = source.snapshot(SnapshotFields::default());

        let target: CollectionStore<Book, String> = CollectionStore::builder()
            .pagination(PaginationFeature::local(10))
            .selection(SelectionFeature::single())
            .build();
        target.restore_snapshot(snapshot);
        assert_eq!(target.entities().len(), 30);
        assert_eq!(target.entities()[0].id, 30);
        assert_eq!(target.page_info().page_index, 1);
        assert_eq!(target.selected_id(), Some(EntityId::Num(5)));
        assert!(target.is_loaded());
    }

    #[test]
    fn snapshot_selection_of_another_mode_is_ignored() {
        let source = store();
        source.select_entity(EntityId::Num(1));
        let snapshot = source.snapshot(SnapshotFields::default());
        let target: CollectionStore<Book, String> = CollectionStore::builder()
            .selection(SelectionFeature::multi())
            .build();
        target.restore_snapshot(snapshot);
        assert_eq!(target.state().selection, SelectionState::multi());
    }
}
