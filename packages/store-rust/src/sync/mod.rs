//! Adapters mirroring store state to external representations.
//!
//! Adapters read the store and write it back on restore; they never
//! originate query changes of their own.

pub mod storage;
pub mod url;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageSync};
pub use url::{MemoryQueryParams, QueryParamsHost, UrlSync};
