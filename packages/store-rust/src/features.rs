//! Feature descriptors composed by the store builder.
//!
//! Each feature contributes a slice of state and the behavior around it.
//! The builder installs them in a fixed order (filter, sort, pagination,
//! selection) and the store consults them when a query changes.

use std::sync::Arc;

use tessera_core::{EntityId, PagedState, PagingState, ScrollWindow, SelectionState, Sort};

use crate::config::StoreDefaults;

/// Local predicate: does `entity` pass `filter`?
pub type FilterFn<T, F> = Arc<dyn Fn(&T, &F) -> bool + Send + Sync>;
/// Hybrid filter switch: does moving from `previous` to `next` need a reload?
pub type IsRemoteFilterFn<F> = Arc<dyn Fn(&F, &F) -> bool + Send + Sync>;

/// How filter changes take effect.
pub enum FilterFeature<T, F> {
    /// Client-side predicate over the resident set.
    Local {
        /// The predicate.
        filter_fn: FilterFn<T, F>,
    },
    /// The filter is sent to the loader and every change reloads.
    Remote,
    /// Remote when `is_remote` says so, otherwise a local predicate over the
    /// last loaded result.
    Hybrid {
        /// The predicate.
        filter_fn: FilterFn<T, F>,
        /// Chooses remote vs. local per change.
        is_remote: IsRemoteFilterFn<F>,
    },
}

impl<T, F> FilterFeature<T, F> {
    /// Local filtering with `filter_fn`.
    pub fn local(filter_fn: impl Fn(&T, &F) -> bool + Send + Sync + 'static) -> Self {
        Self::Local {
            filter_fn: Arc::new(filter_fn),
        }
    }

    /// Remote filtering.
    #[must_use]
    pub fn remote() -> Self {
        Self::Remote
    }

    /// Hybrid filtering.
    pub fn hybrid(
        filter_fn: impl Fn(&T, &F) -> bool + Send + Sync + 'static,
        is_remote: impl Fn(&F, &F) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Hybrid {
            filter_fn: Arc::new(filter_fn),
            is_remote: Arc::new(is_remote),
        }
    }

    pub(crate) fn predicate(&self) -> Option<&FilterFn<T, F>> {
        match self {
            Self::Local { filter_fn } | Self::Hybrid { filter_fn, .. } => Some(filter_fn),
            Self::Remote => None,
        }
    }

    pub(crate) fn is_remote_change(&self, previous: &F, next: &F) -> bool {
        match self {
            Self::Local { .. } => false,
            Self::Remote => true,
            Self::Hybrid { is_remote, .. } => is_remote(previous, next),
        }
    }
}

/// Where sorting happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortFeature {
    /// Stable in-memory sort.
    Local {
        /// Sort active from construction.
        initial: Option<Sort>,
    },
    /// Sort sent to the loader; changes reload.
    Remote {
        /// Sort active from construction.
        initial: Option<Sort>,
    },
}

impl Default for SortFeature {
    fn default() -> Self {
        Self::Local { initial: None }
    }
}

impl SortFeature {
    /// Local sorting, optionally with an initial sort.
    #[must_use]
    pub fn local(initial: Option<Sort>) -> Self {
        Self::Local { initial }
    }

    /// Remote sorting, optionally with an initial sort.
    #[must_use]
    pub fn remote(initial: Option<Sort>) -> Self {
        Self::Remote { initial }
    }

    pub(crate) fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    pub(crate) fn initial(&self) -> Option<Sort> {
        match self {
            Self::Local { initial } | Self::Remote { initial } => initial.clone(),
        }
    }
}

/// Pagination strategy. Sizes left as `None` fall back to [`StoreDefaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationFeature {
    /// No pagination.
    #[default]
    Disabled,
    /// Slice the resident set.
    Local {
        /// Rows per page.
        page_size: Option<usize>,
    },
    /// Fetch and cache pages.
    RemotePaged {
        /// Rows per page.
        page_size: Option<usize>,
        /// Pages fetched per miss and cache capacity.
        pages_to_cache: Option<usize>,
    },
    /// Infinite scroll.
    Scroll {
        /// Rows per chunk.
        page_size: Option<usize>,
        /// Buffered-page limit.
        pages_to_cache: Option<usize>,
    },
}

impl PaginationFeature {
    /// Local pagination with an explicit page size.
    #[must_use]
    pub fn local(page_size: usize) -> Self {
        Self::Local {
            page_size: Some(page_size),
        }
    }

    /// Remote page-based pagination.
    #[must_use]
    pub fn remote_paged(page_size: usize, pages_to_cache: usize) -> Self {
        Self::RemotePaged {
            page_size: Some(page_size),
            pages_to_cache: Some(pages_to_cache),
        }
    }

    /// Infinite scroll.
    #[must_use]
    pub fn scroll(page_size: usize, pages_to_cache: usize) -> Self {
        Self::Scroll {
            page_size: Some(page_size),
            pages_to_cache: Some(pages_to_cache),
        }
    }

    pub(crate) fn initial_state<T: Clone>(self, defaults: &StoreDefaults) -> PagingState<T> {
        match self {
            Self::Disabled => PagingState::Disabled,
            Self::Local { page_size } => PagingState::Local {
                page_index: 0,
                page_size: page_size.unwrap_or(defaults.page_size).max(1),
            },
            Self::RemotePaged {
                page_size,
                pages_to_cache,
            } => PagingState::Remote(PagedState::new(
                page_size.unwrap_or(defaults.page_size).max(1),
                pages_to_cache.unwrap_or(defaults.pages_to_cache),
            )),
            Self::Scroll {
                page_size,
                pages_to_cache,
            } => PagingState::Scroll(ScrollWindow::new(
                page_size.unwrap_or(defaults.scroll_page_size),
                pages_to_cache.unwrap_or(defaults.pages_to_cache),
            )),
        }
    }
}

/// Selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// No selection.
    #[default]
    Disabled,
    /// At most one selected entity.
    Single,
    /// Any number of selected entities.
    Multi,
}

/// Selection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionFeature {
    pub(crate) mode: SelectionMode,
    pub(crate) default_selected_id: Option<EntityId>,
    pub(crate) clear_on_filter: bool,
    pub(crate) clear_on_remote_sort: bool,
}

impl Default for SelectionFeature {
    fn default() -> Self {
        Self::with_mode(SelectionMode::Disabled)
    }
}

impl SelectionFeature {
    fn with_mode(mode: SelectionMode) -> Self {
        Self {
            mode,
            default_selected_id: None,
            clear_on_filter: true,
            clear_on_remote_sort: true,
        }
    }

    /// Single selection.
    #[must_use]
    pub fn single() -> Self {
        Self::with_mode(SelectionMode::Single)
    }

    /// Multi selection.
    #[must_use]
    pub fn multi() -> Self {
        Self::with_mode(SelectionMode::Multi)
    }

    /// Id selected once the collection first becomes non-empty (single mode).
    #[must_use]
    pub fn default_selected_id(mut self, id: impl Into<EntityId>) -> Self {
        self.default_selected_id = Some(id.into());
        self
    }

    /// Whether applying a filter clears the selection (default `true`).
    #[must_use]
    pub fn clear_on_filter(mut self, clear: bool) -> Self {
        self.clear_on_filter = clear;
        self
    }

    /// Whether a remote sort clears the selection (default `true`).
    #[must_use]
    pub fn clear_on_remote_sort(mut self, clear: bool) -> Self {
        self.clear_on_remote_sort = clear;
        self
    }

    pub(crate) fn initial_state(&self) -> SelectionState {
        match self.mode {
            SelectionMode::Disabled => SelectionState::Disabled,
            SelectionMode::Single => SelectionState::single(),
            SelectionMode::Multi => SelectionState::multi(),
        }
    }
}
