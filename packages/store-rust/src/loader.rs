//! The fetch seam between a store and its backend.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::{Entity, FetchRequest, FetchResult, FilterValue, LoadError};

/// Serves fetches for one collection.
///
/// Implemented for any `Fn(FetchRequest<F>) -> impl Future<Output =
/// anyhow::Result<FetchResult<T>>>`, so plain async closures work as loaders.
#[async_trait]
pub trait EntityLoader<T: Entity, F: FilterValue>: Send + Sync + 'static {
    /// Fetches the rows described by `request`.
    async fn fetch(&self, request: FetchRequest<F>) -> anyhow::Result<FetchResult<T>>;
}

#[async_trait]
impl<T, F, Func, Fut> EntityLoader<T, F> for Func
where
    T: Entity,
    F: FilterValue,
    Func: Fn(FetchRequest<F>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<FetchResult<T>>> + Send + 'static,
{
    async fn fetch(&self, request: FetchRequest<F>) -> anyhow::Result<FetchResult<T>> {
        (self)(request).await
    }
}

/// Called with each successfully applied result.
pub type SuccessHook<T> = Arc<dyn Fn(&FetchResult<T>) + Send + Sync>;
/// Called with each stored (mapped) error.
pub type ErrorHook = Arc<dyn Fn(&LoadError) + Send + Sync>;
/// Maps a loader failure into the stored error shape.
pub type ErrorMapper = Arc<dyn Fn(&anyhow::Error) -> LoadError + Send + Sync>;

/// Optional lifecycle hooks around fetches.
pub struct LoaderHooks<T> {
    pub(crate) on_success: Option<SuccessHook<T>>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) map_error: ErrorMapper,
}

impl<T> Default for LoaderHooks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            map_error: Arc::new(LoadError::from_anyhow),
        }
    }
}
