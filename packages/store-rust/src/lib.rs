//! `Tessera` Store: composed reactive collection store with a loading
//! orchestrator, a keyed call cache and URL/storage state sync.
//!
//! A [`CollectionStore`] is assembled from feature descriptions (filter,
//! sort, pagination, selection) and an optional [`EntityLoader`]. Every
//! query change that needs server data moves the call status to loading,
//! which dispatches exactly one fetch and writes its result back through
//! the mutation matching the pagination mode.

pub mod call_cache;
pub mod config;
pub mod error;
pub mod features;
pub mod loader;
pub mod registry;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod viewport;

pub use call_cache::{CacheOptions, CallCache};
pub use config::{CacheConfig, QueryParamFields, StorageSyncConfig, StoreDefaults, UrlSyncConfig};
pub use error::{CacheError, StoreError};
pub use features::{FilterFeature, PaginationFeature, SelectionFeature, SelectionMode, SortFeature};
pub use loader::{EntityLoader, LoaderHooks};
pub use registry::CollectionRegistry;
pub use store::{CollectionStore, CollectionStoreBuilder};
pub use sync::{StorageSync, UrlSync};
pub use telemetry::{init_tracing, LogFormat};
pub use viewport::ViewportDataSource;
