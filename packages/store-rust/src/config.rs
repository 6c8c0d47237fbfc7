//! Store-level configuration defaults.

use std::time::Duration;

use tessera_core::SnapshotFields;

/// Defaults applied when a feature or request does not override them.
#[derive(Debug, Clone)]
pub struct StoreDefaults {
    /// Debounce window for filter changes.
    pub filter_debounce: Duration,
    /// Rows per page for local and remote page-based pagination.
    pub page_size: usize,
    /// Pages fetched per round trip and cached for remote pagination; also
    /// the buffered-page limit for infinite scroll.
    pub pages_to_cache: usize,
    /// Rows per chunk for infinite scroll.
    pub scroll_page_size: usize,
    /// Debounce window for URL query-param writes.
    pub url_write_debounce: Duration,
}

impl Default for StoreDefaults {
    fn default() -> Self {
        Self {
            filter_debounce: Duration::from_millis(400),
            page_size: 10,
            pages_to_cache: 3,
            scroll_page_size: 30,
            url_write_debounce: Duration::from_millis(100),
        }
    }
}

/// Configuration of a [`CallCache`](crate::CallCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum live entries when a call does not set its own limit.
    pub max_cache_size: usize,
    /// Time-to-live when a call does not set its own. `None` caches forever.
    pub expires: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 100,
            expires: None,
        }
    }
}

/// Which query parts are mirrored into URL params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParamFields {
    /// `filter`.
    pub filter: bool,
    /// `sortBy` and `sortDirection`.
    pub sort: bool,
    /// `page`.
    pub page: bool,
    /// `selectedId`.
    pub selected_id: bool,
}

impl Default for QueryParamFields {
    fn default() -> Self {
        Self {
            filter: true,
            sort: true,
            page: true,
            selected_id: true,
        }
    }
}

/// Configuration of a [`UrlSync`](crate::sync::UrlSync).
#[derive(Debug, Clone, Default)]
pub struct UrlSyncConfig {
    /// Param namespace. Falls back to the collection name, then to none.
    pub prefix: Option<String>,
    /// Debounce of URL writes. Falls back to the store default.
    pub write_debounce: Option<Duration>,
    /// Mirrored parts.
    pub fields: QueryParamFields,
}

/// Configuration of a [`StorageSync`](crate::sync::StorageSync).
#[derive(Debug, Clone)]
pub struct StorageSyncConfig {
    /// Storage key of the snapshot. The timestamp lives under `"<key>-date"`.
    pub key: String,
    /// Maximum snapshot age accepted on restore. `None` accepts any age.
    pub expires: Option<Duration>,
    /// Minimum delay between writes. Zero writes on every change.
    pub throttle: Duration,
    /// Persisted parts.
    pub fields: SnapshotFields,
}

impl StorageSyncConfig {
    /// Config for `key` with no expiry, no throttle and every field.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expires: None,
            throttle: Duration::ZERO,
            fields: SnapshotFields::default(),
        }
    }

    /// Storage key of the snapshot timestamp.
    #[must_use]
    pub fn date_key(&self) -> String {
        format!("{}-date", self.key)
    }
}
