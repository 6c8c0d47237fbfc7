//! Viewport-driven data source for virtualized lists over a scroll store.

use std::ops::Range;

use tessera_core::{Entity, FilterValue};
use tracing::debug;

use crate::store::CollectionStore;

/// Feeds a virtualized list from a scroll-paginated store.
///
/// The list reports its visible range; once the range comes within
/// `threshold` rows of the end of the buffered window, the next chunk is
/// requested.
pub struct ViewportDataSource<T, F> {
    store: CollectionStore<T, F>,
    threshold: usize,
}

impl<T: Entity, F: FilterValue> ViewportDataSource<T, F> {
    /// Wraps `store`, prefetching when the viewport is within `threshold`
    /// rows of the buffered tail.
    #[must_use]
    pub fn new(store: CollectionStore<T, F>, threshold: usize) -> Self {
        Self { store, threshold }
    }

    /// The wrapped store.
    #[must_use]
    pub fn store(&self) -> &CollectionStore<T, F> {
        &self.store
    }

    /// Records the visible range. Returns whether a fetch was issued.
    pub fn set_visible_range(&self, range: Range<usize>) -> bool {
        let end = range.end;
        self.store.set_viewport(range);
        let Some(window) = self.store.window_range() else {
            return false;
        };
        if end.saturating_add(self.threshold) < window.end {
            return false;
        }
        let issued = self.store.load_more_entities();
        if issued {
            debug!(end, window_end = window.end, "viewport near tail, loading more");
        }
        issued
    }

    /// Rows addressable so far: the absolute end of the buffered window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.window_range().map_or(0, |window| window.end)
    }

    /// Whether nothing has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row at an absolute index, if still buffered.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.store.entity_at(index)
    }
}
