//! Page math and the bounded page cache for remote page-based pagination.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of pages needed for `total` rows: `ceil(total / page_size)`.
///
/// A zero page size yields zero pages.
#[must_use]
pub fn pages_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

/// Derived paging flags for the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Zero-based index of the current page.
    pub page_index: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Total rows across all pages.
    pub total: usize,
    /// `ceil(total / page_size)`.
    pub pages_count: usize,
    /// `page_index > 0`.
    pub has_previous: bool,
    /// `page_index < pages_count - 1`.
    pub has_next: bool,
}

impl PageInfo {
    /// Computes the flags for a page position.
    #[must_use]
    pub fn new(page_index: usize, page_size: usize, total: usize) -> Self {
        let pages_count = pages_count(total, page_size);
        Self {
            page_index,
            page_size,
            total,
            pages_count,
            has_previous: page_index > 0,
            has_next: page_index + 1 < pages_count,
        }
    }

    /// Whether `page_index` addresses an existing page.
    ///
    /// Page 0 is always valid so an empty result set still has a first page.
    #[must_use]
    pub fn is_valid_page(page_index: usize, page_size: usize, total: usize) -> bool {
        page_index == 0 || page_index < pages_count(total, page_size)
    }
}

/// A page of entities together with its paging flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Entities on the page, in display order.
    pub entities: Vec<T>,
    /// Position and flags.
    pub info: PageInfo,
}

/// Slices page `page_index` out of a fully resident list.
#[must_use]
pub fn local_page<T: Clone>(items: &[T], page_index: usize, page_size: usize) -> Vec<T> {
    let start = page_index.saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    items[start..end].to_vec()
}

#[derive(Debug, Clone)]
struct CachedPage<T> {
    entities: Vec<T>,
    last_requested: u64,
}

/// Bounded cache of fetched pages with least-recently-requested eviction.
#[derive(Debug, Clone)]
pub struct PageCache<T> {
    capacity: usize,
    pages: HashMap<usize, CachedPage<T>>,
    tick: u64,
}

impl<T: Clone> PageCache<T> {
    /// Creates a cache holding at most `capacity` pages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pages: HashMap::new(),
            tick: 0,
        }
    }

    /// Returns a page and marks it as most recently requested.
    pub fn get(&mut self, page_index: usize) -> Option<&[T]> {
        self.tick += 1;
        let tick = self.tick;
        let page = self.pages.get_mut(&page_index)?;
        page.last_requested = tick;
        Some(&page.entities)
    }

    /// Returns a page without touching its recency.
    #[must_use]
    pub fn peek(&self, page_index: usize) -> Option<&[T]> {
        self.pages.get(&page_index).map(|page| page.entities.as_slice())
    }

    /// Whether a page is cached.
    #[must_use]
    pub fn contains(&self, page_index: usize) -> bool {
        self.pages.contains_key(&page_index)
    }

    /// Stores a page as most recently requested, evicting the least recently
    /// requested page when the cache is full. Returns the evicted index.
    pub fn insert(&mut self, page_index: usize, entities: Vec<T>) -> Option<usize> {
        self.tick += 1;
        let mut evicted = None;
        if !self.pages.contains_key(&page_index) && self.pages.len() >= self.capacity {
            evicted = self
                .pages
                .iter()
                .min_by_key(|(_, page)| page.last_requested)
                .map(|(index, _)| *index);
            if let Some(index) = evicted {
                self.pages.remove(&index);
            }
        }
        self.pages.insert(
            page_index,
            CachedPage {
                entities,
                last_requested: self.tick,
            },
        );
        evicted
    }

    /// Drops every page.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Number of cached pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Maximum number of cached pages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached page indices in ascending order.
    #[must_use]
    pub fn cached_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.pages.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

/// State of remote page-based pagination.
#[derive(Debug, Clone)]
pub struct PagedState<T> {
    /// Current page.
    pub page_index: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Pages fetched per round trip and cache capacity.
    pub pages_to_cache: usize,
    /// Total rows reported by the backend, once known.
    pub total: Option<usize>,
    /// Fetched pages.
    pub cache: PageCache<T>,
}

impl<T: Clone> PagedState<T> {
    /// Fresh state on page 0 with an empty cache.
    #[must_use]
    pub fn new(page_size: usize, pages_to_cache: usize) -> Self {
        Self {
            page_index: 0,
            page_size,
            pages_to_cache: pages_to_cache.max(1),
            total: None,
            cache: PageCache::new(pages_to_cache),
        }
    }

    /// Back to page 0 with no cached pages. The total is kept until the
    /// next response replaces it.
    pub fn invalidate(&mut self) {
        self.page_index = 0;
        self.cache.clear();
    }

    /// Changes the page size. A different size means different windowing,
    /// so cached pages are dropped and paging restarts at page 0.
    pub fn set_page_size(&mut self, page_size: usize) {
        if page_size != self.page_size {
            self.page_size = page_size;
            self.invalidate();
        }
    }

    /// The row window to request for a cache miss on `page_index`.
    ///
    /// Always widens to `page_size * pages_to_cache` rows anchored at the
    /// requested page, clamped to the known total.
    #[must_use]
    pub fn request_window(&self, page_index: usize) -> (usize, usize) {
        let start = page_index.saturating_mul(self.page_size);
        let mut size = self.page_size.saturating_mul(self.pages_to_cache);
        if let Some(total) = self.total {
            if start < total {
                size = size.min(total - start);
            }
        }
        (start, size)
    }

    /// Splits a response for `first_page` into pages and caches them.
    ///
    /// The requested page is inserted last so it is the most recently
    /// requested entry. Returns the indices that were seeded.
    pub fn seed(&mut self, first_page: usize, entities: Vec<T>) -> Vec<usize> {
        let size = self.page_size.max(1);
        let mut chunks: Vec<(usize, Vec<T>)> = entities
            .chunks(size)
            .enumerate()
            .map(|(offset, chunk)| (first_page + offset, chunk.to_vec()))
            .collect();
        if chunks.is_empty() {
            chunks.push((first_page, Vec::new()));
        }
        chunks.truncate(self.pages_to_cache);
        let seeded: Vec<usize> = chunks.iter().map(|(index, _)| *index).collect();
        for (index, chunk) in chunks.into_iter().rev() {
            self.cache.insert(index, chunk);
        }
        seeded
    }

    /// Paging flags for the current page.
    #[must_use]
    pub fn info(&self) -> PageInfo {
        PageInfo::new(self.page_index, self.page_size, self.total.unwrap_or(0))
    }
}
