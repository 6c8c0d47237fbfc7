//! The composed per-collection state held in the store's reactive cell.

use crate::call_status::CallStatus;
use crate::collection::EntityCollection;
use crate::id::EntityId;
use crate::paging::PagedState;
use crate::scroll::ScrollWindow;
use crate::selection::SelectionState;
use crate::sort::Sort;

/// Pagination strategy and its state.
#[derive(Debug, Clone)]
pub enum PagingState<T> {
    /// No pagination: every visible entity is on the single page.
    Disabled,
    /// Pure slicing over the resident, filtered set.
    Local {
        /// Current page.
        page_index: usize,
        /// Rows per page.
        page_size: usize,
    },
    /// Remote page-based pagination with a bounded page cache.
    Remote(PagedState<T>),
    /// Remote infinite scroll with an accumulating window.
    Scroll(ScrollWindow),
}

impl<T> PagingState<T> {
    /// Current page index (0 when disabled).
    #[must_use]
    pub fn page_index(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Local { page_index, .. } => *page_index,
            Self::Remote(paged) => paged.page_index,
            Self::Scroll(window) => window.current_page,
        }
    }

    /// Rows per page, if paginated.
    #[must_use]
    pub fn page_size(&self) -> Option<usize> {
        match self {
            Self::Disabled => None,
            Self::Local { page_size, .. } => Some(*page_size),
            Self::Remote(paged) => Some(paged.page_size),
            Self::Scroll(window) => Some(window.page_size),
        }
    }
}

impl<T: Clone> PagingState<T> {
    /// Moves back to page 0. With `invalidate`, also drops cached pages and
    /// the scroll window; returns the ids the window held.
    pub fn reset(&mut self, invalidate: bool) -> Vec<EntityId> {
        match self {
            Self::Disabled => Vec::new(),
            Self::Local { page_index, .. } => {
                *page_index = 0;
                Vec::new()
            }
            Self::Remote(paged) => {
                if invalidate {
                    paged.invalidate();
                } else {
                    paged.page_index = 0;
                }
                Vec::new()
            }
            Self::Scroll(window) => {
                if invalidate {
                    window.reset()
                } else {
                    window.current_page = 0;
                    Vec::new()
                }
            }
        }
    }
}

/// Everything one collection owns: entities, query inputs, paging,
/// selection and call status.
#[derive(Debug, Clone)]
pub struct CollectionState<T, F> {
    /// Resident entities. For remote paging these are the current page's
    /// rows; for scroll mode, the buffered window.
    pub entities: EntityCollection<T>,
    /// Latest stored filter value (what `current_filter()` reports).
    pub filter: F,
    /// Filter value the local predicate evaluates.
    pub applied_filter: F,
    /// Active sort.
    pub sort: Option<Sort>,
    /// Pagination strategy.
    pub paging: PagingState<T>,
    /// Selection model.
    pub selection: SelectionState,
    /// Fetch lifecycle.
    pub call_status: CallStatus,
    /// Bumped whenever the filter/sort/page-size context of remote requests
    /// changes. Results dispatched under an older generation are stale.
    pub generation: u64,
}

impl<T, F: Clone> CollectionState<T, F> {
    /// Fresh state: no entities, idle, generation 0.
    pub fn new(
        filter: F,
        sort: Option<Sort>,
        paging: PagingState<T>,
        selection: SelectionState,
    ) -> Self {
        Self {
            entities: EntityCollection::default(),
            applied_filter: filter.clone(),
            filter,
            sort,
            paging,
            selection,
            call_status: CallStatus::Idle,
            generation: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_idle_and_empty() {
        let state: CollectionState<u32, String> = CollectionState::new(
            "q".to_string(),
            None,
            PagingState::Local {
                page_index: 0,
                page_size: 10,
            },
            SelectionState::multi(),
        );
        assert!(state.entities.is_empty());
        assert_eq!(state.applied_filter, "q");
        assert_eq!(state.call_status, CallStatus::Idle);
        assert_eq!(state.paging.page_size(), Some(10));
    }

    #[test]
    fn paging_accessors_work_for_any_row_type() {
        let paging: PagingState<std::sync::Mutex<u8>> = PagingState::Local {
            page_index: 2,
            page_size: 5,
        };
        assert_eq!(paging.page_index(), 2);
        assert_eq!(paging.page_size(), Some(5));
    }

    #[test]
    fn reset_keeps_cache_unless_invalidating() {
        let mut paging: PagingState<u32> = PagingState::Remote(PagedState::new(10, 3));
        if let PagingState::Remote(paged) = &mut paging {
            paged.seed(0, (0..10).collect());
            paged.page_index = 4;
        }
        paging.reset(false);
        assert_eq!(paging.page_index(), 0);
        let PagingState::Remote(paged) = &paging else {
            unreachable!()
        };
        assert_eq!(paged.cache.len(), 1);

        paging.reset(true);
        let PagingState::Remote(paged) = &paging else {
            unreachable!()
        };
        assert!(paged.cache.is_empty());
    }

    #[test]
    fn scroll_reset_returns_buffered_ids() {
        let mut window = ScrollWindow::new(2, 3);
        window.push_page(0, vec![EntityId::Num(1), EntityId::Num(2)]);
        let mut paging: PagingState<u32> = PagingState::Scroll(window);
        assert_eq!(paging.reset(true).len(), 2);
    }
}
