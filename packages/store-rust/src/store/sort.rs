//! Sort dispatch.

use tessera_core::sort::sort_collection;
use tessera_core::{Entity, FilterValue, PagingState, Sort};
use tracing::debug;

use super::CollectionStore;

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Sorts the collection.
    ///
    /// `None` re-applies the active sort. Local sorting is a stable in-memory
    /// sort and moves to page 0 when the sort changed. Scroll windows keep
    /// the backend's order, so a local sort there is only recorded. Remote
    /// sorting stores the sort, invalidates cached pages, clears the
    /// selection (unless the selection feature opts out) and reloads.
    pub fn sort_entities(&self, sort: Option<Sort>) {
        if self.shared.sort.is_remote() {
            let Some(sort) = sort else {
                debug!(collection = ?self.shared.collection, "remote sort unchanged");
                return;
            };
            let clear_selection = self.shared.selection.clear_on_remote_sort;
            self.shared.state.update(|s| {
                s.sort = Some(sort);
                let dropped = s.paging.reset(true);
                s.entities.remove_many(&dropped);
                if matches!(s.paging, PagingState::Remote(_)) {
                    s.entities.clear();
                }
                if clear_selection {
                    s.selection.clear();
                }
                s.generation += 1;
            });
            self.shared.request_reload();
            return;
        }

        let (in_scroll, fetch) = self.shared.state.update(|s| {
            let in_scroll = matches!(s.paging, PagingState::Scroll(_));
            let Some(sort) = sort.or_else(|| s.sort.clone()) else {
                return (in_scroll, false);
            };
            if !in_scroll {
                sort_collection(&mut s.entities, &sort);
            }
            if s.sort.as_ref() == Some(&sort) {
                return (in_scroll, false);
            }
            s.sort = Some(sort);
            let fetch = self.shared.rewind_remote_page(s);
            s.paging.reset(false);
            (in_scroll, fetch)
        });
        if in_scroll {
            debug!(
                collection = ?self.shared.collection,
                "local sort stored; scroll windows keep backend order"
            );
        }
        if fetch {
            self.shared.request_reload();
        }
    }
}
