//! Error types surfaced by the store crate.

use std::sync::Arc;

/// Errors from [`CallCache`](crate::CallCache) lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key could not be canonicalized.
    #[error("cache key is not serializable: {0}")]
    Key(String),
    /// The source failed. Shared by every caller coalesced onto the call.
    #[error("cached call failed: {0}")]
    Source(Arc<anyhow::Error>),
}

/// Errors from registry and sync adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Only named collections can be registered.
    #[error("collection has no name")]
    UnnamedCollection,
    /// A collection with this name is already registered.
    #[error("collection already registered: {name}")]
    DuplicateCollection { name: String },
    /// A storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
    /// A snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
