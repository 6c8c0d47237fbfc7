//! Page navigation for local, remote-paged and scroll pagination.

use std::ops::Range;

use tessera_core::{pages_count, Entity, FilterValue, PageInfo, PagingState};
use tracing::debug;

use super::CollectionStore;

enum Step {
    Rejected,
    Moved,
    Served,
    Reload,
}

enum Resize {
    Done,
    Rewind,
    Reload,
}

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Moves to `page_index`.
    ///
    /// Local paging only slices. Remote paging serves cached pages without a
    /// fetch and loads a `page_size * pages_to_cache` window on a miss. In
    /// scroll mode, buffered pages are served as is, the page right after
    /// the window loads one more chunk, and any other page restarts the
    /// window there.
    ///
    /// Returns `false` when the page is rejected: out of range for a known
    /// total, past the end of a finished scroll, or pagination disabled.
    pub fn load_entities_page(&self, page_index: usize) -> bool {
        let step = self.shared.state.update(|s| {
            let visible_len = if matches!(s.paging, PagingState::Local { .. }) {
                self.shared.visible(s).len()
            } else {
                0
            };
            let loading = s.call_status.is_loading();
            let step = match &mut s.paging {
                PagingState::Disabled => Step::Rejected,
                PagingState::Local {
                    page_index: current,
                    page_size,
                } => {
                    if PageInfo::is_valid_page(page_index, *page_size, visible_len) {
                        *current = page_index;
                        Step::Moved
                    } else {
                        Step::Rejected
                    }
                }
                PagingState::Remote(paged) => {
                    if paged.total.is_some_and(|total| {
                        !PageInfo::is_valid_page(page_index, paged.page_size, total)
                    }) {
                        Step::Rejected
                    } else {
                        paged.page_index = page_index;
                        s.generation += 1;
                        match paged.cache.get(page_index).map(<[T]>::to_vec) {
                            Some(rows) => {
                                s.entities.set_all(rows);
                                Step::Served
                            }
                            None => {
                                s.entities.clear();
                                Step::Reload
                            }
                        }
                    }
                }
                PagingState::Scroll(window) => {
                    if window.is_buffered(page_index) {
                        window.current_page = page_index;
                        Step::Moved
                    } else if page_index == window.next_page() {
                        if window.has_more && !loading {
                            window.current_page = page_index;
                            window.request_page = page_index;
                            Step::Reload
                        } else {
                            Step::Rejected
                        }
                    } else {
                        let dropped = window.restart_at(page_index);
                        s.entities.remove_many(&dropped);
                        s.generation += 1;
                        Step::Reload
                    }
                }
            };
            if matches!(step, Step::Served) {
                self.shared.entities_changed(s);
            }
            step
        });
        match step {
            Step::Rejected => {
                debug!(collection = ?self.shared.collection, page_index, "page rejected");
                false
            }
            Step::Moved | Step::Served => true,
            Step::Reload => {
                self.shared.request_reload();
                true
            }
        }
    }

    /// Moves one page forward.
    pub fn load_entities_next_page(&self) -> bool {
        let current = self.shared.state.with(|s| s.paging.page_index());
        self.load_entities_page(current + 1)
    }

    /// Moves one page back. No-op on the first page.
    pub fn load_entities_previous_page(&self) -> bool {
        let current = self.shared.state.with(|s| s.paging.page_index());
        match current.checked_sub(1) {
            Some(previous) => self.load_entities_page(previous),
            None => false,
        }
    }

    /// Moves to page 0.
    pub fn load_entities_first_page(&self) -> bool {
        self.load_entities_page(0)
    }

    /// Moves to the last page. Remote paging needs a known total; scroll mode
    /// moves to the last buffered page.
    pub fn load_entities_last_page(&self) -> bool {
        let last = self.shared.state.with(|s| match &s.paging {
            PagingState::Disabled => None,
            PagingState::Local { page_size, .. } => {
                Some(pages_count(self.shared.visible(s).len(), *page_size).saturating_sub(1))
            }
            PagingState::Remote(paged) => paged
                .total
                .map(|total| pages_count(total, paged.page_size).saturating_sub(1)),
            PagingState::Scroll(window) => window.last_page(),
        });
        match last {
            Some(last) => self.load_entities_page(last),
            None => false,
        }
    }

    /// Changes the page size and returns to page 0. For remote paging and
    /// scroll, a different size drops every cached row and reloads; the same
    /// size navigates to page 0 like [`load_entities_first_page`].
    ///
    /// [`load_entities_first_page`]: Self::load_entities_first_page
    pub fn set_page_size(&self, page_size: usize) {
        let page_size = page_size.max(1);
        let resize = self.shared.state.update(|s| match &mut s.paging {
            PagingState::Disabled => Resize::Done,
            PagingState::Local {
                page_index,
                page_size: current,
            } => {
                *current = page_size;
                *page_index = 0;
                Resize::Done
            }
            PagingState::Remote(paged) => {
                if paged.page_size == page_size {
                    return Resize::Rewind;
                }
                paged.set_page_size(page_size);
                s.entities.clear();
                s.generation += 1;
                Resize::Reload
            }
            PagingState::Scroll(window) => {
                if window.page_size == page_size {
                    return Resize::Rewind;
                }
                let dropped = window.reset();
                window.page_size = page_size;
                s.entities.remove_many(&dropped);
                s.generation += 1;
                Resize::Reload
            }
        });
        match resize {
            Resize::Done => {}
            Resize::Rewind => {
                self.load_entities_page(0);
            }
            Resize::Reload => self.shared.request_reload(),
        }
    }

    /// Appends the next scroll chunk.
    ///
    /// No-op outside scroll mode, while a load is in progress, or once the
    /// backend reported no more rows. Returns whether a fetch was issued.
    pub fn load_more_entities(&self) -> bool {
        let eligible = self.shared.state.with(|s| match &s.paging {
            PagingState::Scroll(window) => window.has_more && !s.call_status.is_loading(),
            _ => false,
        });
        if !eligible {
            return false;
        }
        self.shared.state.update(|s| {
            if let PagingState::Scroll(window) = &mut s.paging {
                window.request_page = window.next_page();
            }
        });
        self.shared.request_reload();
        true
    }

    /// Records the absolute range a virtualized consumer shows.
    ///
    /// Buffered pages the viewport has moved past become evictable, and the
    /// current page follows the viewport start. No-op outside scroll mode.
    pub fn set_viewport(&self, range: Range<usize>) {
        let in_scroll = self
            .shared
            .state
            .with(|s| matches!(s.paging, PagingState::Scroll(_)));
        if !in_scroll {
            return;
        }
        self.shared.state.update(|s| {
            if let PagingState::Scroll(window) = &mut s.paging {
                window.current_page = range.start / window.page_size;
                let evicted = window.set_viewport(range);
                s.entities.remove_many(&evicted);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use tessera_core::{EntityId, FetchRequest, FetchResult, PageRequest};

    use super::*;
    use crate::features::PaginationFeature;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: usize,
    }

    impl Entity for Row {
        fn id(&self) -> EntityId {
            EntityId::Num(i64::try_from(self.id).unwrap())
        }
    }

    type Requests = Arc<Mutex<Vec<PageRequest>>>;

    /// Serves `total` numbered rows, recording every requested window.
    fn paged_store(
        total: usize,
        page_size: usize,
        pages_to_cache: usize,
    ) -> (CollectionStore<Row, String>, Requests) {
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        let store = CollectionStore::builder()
            .pagination(PaginationFeature::remote_paged(page_size, pages_to_cache))
            .loader(move |request: FetchRequest<String>| {
                let page = request.page.unwrap();
                sink.lock().push(page);
                async move {
                    let end = (page.start_index + page.size).min(total);
                    let rows = (page.start_index.min(end)..end).map(|id| Row { id }).collect();
                    Ok::<_, anyhow::Error>(FetchResult::Page {
                        entities: rows,
                        total,
                    })
                }
            })
            .build();
        (store, requests)
    }

    /// Serves `total` numbered rows in chunks, letting `hasMore` be derived.
    fn scroll_store(
        total: usize,
        page_size: usize,
        pages_to_cache: usize,
    ) -> (CollectionStore<Row, String>, Requests) {
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        let store = CollectionStore::builder()
            .pagination(PaginationFeature::scroll(page_size, pages_to_cache))
            .loader(move |request: FetchRequest<String>| {
                let page = request.page.unwrap();
                sink.lock().push(page);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let end = (page.start_index + page.size).min(total);
                    let rows = (page.start_index.min(end)..end).map(|id| Row { id }).collect();
                    Ok::<_, anyhow::Error>(FetchResult::Entities(rows))
                }
            })
            .build();
        (store, requests)
    }

    fn row_ids(store: &CollectionStore<Row, String>) -> Vec<usize> {
        store.visible_entities().iter().map(|row| row.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn miss_fetches_a_widened_window_anchored_at_the_page() {
        let (store, requests) = paged_store(200, 10, 3);
        assert!(store.load_entities_page(7));
        store.settled().await;
        assert_eq!(
            requests.lock().clone(),
            vec![PageRequest {
                page_index: 7,
                start_index: 70,
                size: 30,
            }]
        );
        assert_eq!(row_ids(&store), (70..80).collect::<Vec<_>>());

        assert!(store.load_entities_next_page());
        assert!(store.load_entities_next_page());
        assert!(!store.is_loading());
        assert_eq!(requests.lock().len(), 1);
        assert_eq!(row_ids(&store), (90..100).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_clamped_to_the_known_total() {
        let (store, requests) = paged_store(25, 10, 3);
        store.set_loading();
        store.settled().await;
        let info = store.page_info();
        assert_eq!(info.total, 25);
        assert_eq!(info.pages_count, 3);
        assert!(store.load_entities_last_page());
        assert_eq!(row_ids(&store), (20..25).collect::<Vec<_>>());
        assert!(!store.page_info().has_next);
        assert_eq!(requests.lock().len(), 1);
        assert!(!store.load_entities_page(3));
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_requested_page_is_evicted() {
        let (store, requests) = paged_store(1000, 10, 3);
        store.set_loading();
        store.settled().await;
        store.load_entities_page(1);
        store.load_entities_page(10);
        store.settled().await;
        assert_eq!(requests.lock().len(), 2);

        store.load_entities_page(0);
        store.settled().await;
        assert_eq!(requests.lock().len(), 3);
        assert_eq!(requests.lock()[2].page_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn page_size_change_invalidates_the_cache() {
        let (store, requests) = paged_store(100, 10, 2);
        store.set_loading();
        store.settled().await;
        store.load_entities_page(1);
        store.set_page_size(25);
        store.settled().await;
        assert_eq!(store.page_info().page_index, 0);
        assert_eq!(
            requests.lock().last().copied(),
            Some(PageRequest {
                page_index: 0,
                start_index: 0,
                size: 50,
            })
        );
        assert_eq!(row_ids(&store).len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn same_page_size_shows_the_first_page_rows() {
        let (store, requests) = paged_store(100, 10, 1);
        store.set_loading();
        store.settled().await;
        assert!(store.load_entities_page(3));
        store.settled().await;
        assert_eq!(row_ids(&store), (30..40).collect::<Vec<_>>());

        store.set_page_size(10);
        store.settled().await;
        assert_eq!(store.page_info().page_index, 0);
        assert_eq!(row_ids(&store), (0..10).collect::<Vec<_>>());
        assert_eq!(
            requests.lock().last().copied(),
            Some(PageRequest {
                page_index: 0,
                start_index: 0,
                size: 10,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn same_scroll_page_size_returns_to_the_first_page() {
        let (store, requests) = scroll_store(100, 10, 5);
        store.set_loading();
        store.settled().await;
        assert!(store.load_entities_next_page());
        store.settled().await;
        assert_eq!(store.page_info().page_index, 1);

        store.set_page_size(10);
        store.settled().await;
        assert_eq!(store.page_info().page_index, 0);
        assert_eq!(requests.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_appends_until_exhausted() {
        let (store, requests) = scroll_store(25, 10, 5);
        store.set_loading();
        store.settled().await;
        assert!(store.has_more());
        assert!(store.load_more_entities());
        store.settled().await;
        assert!(store.load_more_entities());
        store.settled().await;
        assert_eq!(row_ids(&store), (0..25).collect::<Vec<_>>());
        assert!(!store.has_more());

        let before = store.state().entities.len();
        assert!(!store.load_more_entities());
        assert_eq!(requests.lock().len(), 3);
        assert_eq!(store.state().entities.len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_while_loading_is_ignored() {
        let (store, requests) = scroll_store(100, 10, 5);
        store.set_loading();
        assert!(!store.load_more_entities());
        store.settled().await;
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_inside_the_window_does_not_fetch() {
        let (store, requests) = scroll_store(100, 10, 5);
        store.set_loading();
        store.settled().await;
        assert!(store.load_entities_next_page());
        store.settled().await;
        assert_eq!(requests.lock().len(), 2);

        assert!(store.load_entities_previous_page());
        assert!(store.load_entities_next_page());
        assert!(store.load_entities_first_page());
        assert_eq!(requests.lock().len(), 2);
        assert_eq!(store.entity_at(15).map(|row| row.id), Some(15));
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_front_restarts_the_window() {
        let (store, requests) = scroll_store(100, 10, 2);
        store.set_loading();
        store.settled().await;
        for _ in 0..2 {
            store.load_more_entities();
            store.settled().await;
        }
        assert_eq!(store.window_range(), Some(10..30));
        assert!(store.entity_at(5).is_none());

        assert!(store.load_entities_page(0));
        store.settled().await;
        assert_eq!(requests.lock().last().map(|p| p.page_index), Some(0));
        assert_eq!(store.window_range(), Some(0..10));
        assert_eq!(store.state().entities.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn viewport_holds_pages_until_it_moves_past_them() {
        let (store, _requests) = scroll_store(100, 10, 2);
        store.set_loading();
        store.settled().await;
        store.set_viewport(5..12);
        for _ in 0..2 {
            store.load_more_entities();
            store.settled().await;
        }
        assert_eq!(store.window_range(), Some(0..30));
        store.set_viewport(12..20);
        assert_eq!(store.window_range(), Some(10..30));
        assert_eq!(store.page_info().page_index, 1);
    }

    #[test]
    fn local_navigation_respects_bounds() {
        let store: CollectionStore<Row, String> = CollectionStore::builder()
            .pagination(PaginationFeature::local(10))
            .entities((0..25).map(|id| Row { id }))
            .build();
        assert!(!store.load_entities_previous_page());
        assert!(store.load_entities_last_page());
        assert_eq!(store.page_info().page_index, 2);
        assert!(!store.load_entities_next_page());
        assert!(!store.load_entities_page(9999));
        store.set_page_size(5);
        assert_eq!(store.page_info().pages_count, 5);
        assert_eq!(store.page_info().page_index, 0);
    }
}
