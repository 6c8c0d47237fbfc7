//! Accumulating window for infinite-scroll pagination.
//!
//! Pages are appended at the back as the consumer scrolls forward. Once more
//! than `pages_to_cache` pages are buffered, the oldest page is dropped from
//! the front, unless the consumer's viewport still shows part of it. Entities
//! keep their absolute index (`page * page_size + row`) for as long as they
//! are buffered.

use std::collections::VecDeque;
use std::ops::Range;

use crate::id::EntityId;

#[derive(Debug, Clone)]
struct BufferedPage {
    index: usize,
    ids: Vec<EntityId>,
}

/// Scroll pagination state plus the buffered id window.
#[derive(Debug, Clone)]
pub struct ScrollWindow {
    /// Page the consumer is positioned on.
    pub current_page: usize,
    /// Last page requested from the backend. Only grows while scrolling forward.
    pub request_page: usize,
    /// Rows per fetched chunk.
    pub page_size: usize,
    /// Maximum buffered pages before front eviction.
    pub pages_to_cache: usize,
    /// Whether the backend has rows past the buffered window.
    pub has_more: bool,
    pages: VecDeque<BufferedPage>,
    offset: usize,
    viewport: Option<Range<usize>>,
}

impl ScrollWindow {
    /// Empty window positioned before page 0.
    #[must_use]
    pub fn new(page_size: usize, pages_to_cache: usize) -> Self {
        Self {
            current_page: 0,
            request_page: 0,
            page_size: page_size.max(1),
            pages_to_cache: pages_to_cache.max(1),
            has_more: true,
            pages: VecDeque::new(),
            offset: 0,
            viewport: None,
        }
    }

    /// Clears the window and page indices. Returns the ids that were buffered.
    pub fn reset(&mut self) -> Vec<EntityId> {
        self.restart_at(0)
    }

    /// Clears the window so the next fetch starts at `page`.
    /// Returns the ids that were buffered.
    pub fn restart_at(&mut self, page: usize) -> Vec<EntityId> {
        let dropped = self.ids().cloned().collect();
        self.pages.clear();
        self.current_page = page;
        self.request_page = page;
        self.offset = page.saturating_mul(self.page_size);
        self.has_more = true;
        self.viewport = None;
        dropped
    }

    /// First buffered page index.
    #[must_use]
    pub fn first_page(&self) -> Option<usize> {
        self.pages.front().map(|page| page.index)
    }

    /// Last buffered page index.
    #[must_use]
    pub fn last_page(&self) -> Option<usize> {
        self.pages.back().map(|page| page.index)
    }

    /// Whether `page` is currently buffered.
    #[must_use]
    pub fn is_buffered(&self, page: usize) -> bool {
        self.pages.iter().any(|buffered| buffered.index == page)
    }

    /// Page to request for the next forward chunk.
    #[must_use]
    pub fn next_page(&self) -> usize {
        self.last_page().map_or(self.request_page, |last| last + 1)
    }

    /// Appends a fetched page and evicts overflow from the front.
    ///
    /// Returns the ids evicted from the window. A page that is already
    /// buffered is ignored.
    pub fn push_page(&mut self, index: usize, ids: Vec<EntityId>) -> Vec<EntityId> {
        if self.is_buffered(index) {
            return Vec::new();
        }
        if self.pages.is_empty() {
            self.offset = index.saturating_mul(self.page_size);
        }
        self.pages.push_back(BufferedPage { index, ids });
        self.evict_overflow()
    }

    /// Records the consumer's visible absolute range and evicts pages that
    /// have scrolled out of it.
    pub fn set_viewport(&mut self, range: Range<usize>) -> Vec<EntityId> {
        self.viewport = Some(range);
        self.evict_overflow()
    }

    /// The last recorded viewport.
    #[must_use]
    pub fn viewport(&self) -> Option<Range<usize>> {
        self.viewport.clone()
    }

    fn evict_overflow(&mut self) -> Vec<EntityId> {
        let mut evicted = Vec::new();
        while self.pages.len() > self.pages_to_cache {
            let Some(front) = self.pages.front() else {
                break;
            };
            let front_end = self.offset + front.ids.len();
            if self
                .viewport
                .as_ref()
                .is_some_and(|viewport| viewport.start < front_end)
            {
                break;
            }
            if let Some(page) = self.pages.pop_front() {
                self.offset = front_end;
                evicted.extend(page.ids);
            }
        }
        evicted
    }

    /// Absolute index of the first buffered entity.
    #[must_use]
    pub fn start(&self) -> usize {
        self.offset
    }

    /// Absolute index one past the last buffered entity.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.buffered_len()
    }

    /// Number of buffered entities.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.pages.iter().map(|page| page.ids.len()).sum()
    }

    /// Number of buffered pages.
    #[must_use]
    pub fn buffered_pages(&self) -> usize {
        self.pages.len()
    }

    /// Id at an absolute index, if it is still buffered.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<&EntityId> {
        let mut relative = index.checked_sub(self.offset)?;
        for page in &self.pages {
            if relative < page.ids.len() {
                return page.ids.get(relative);
            }
            relative -= page.ids.len();
        }
        None
    }

    /// Buffered ids in window order.
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.pages.iter().flat_map(|page| page.ids.iter())
    }
}

/// Decides whether more rows exist after a scroll chunk arrives.
///
/// An explicit flag wins. Otherwise a short chunk means the end was reached;
/// a full chunk defers to `total` when known and assumes more otherwise.
#[must_use]
pub fn derive_has_more(
    explicit: Option<bool>,
    received: usize,
    page_size: usize,
    total: Option<usize>,
    accumulated_end: usize,
) -> bool {
    if let Some(has_more) = explicit {
        return has_more;
    }
    if received < page_size {
        return false;
    }
    total.map_or(true, |total| accumulated_end < total)
}
