//! Explicit feature pipeline for [`CollectionStore`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{CollectionState, Entity, FetchResult, FilterValue, LoadError, Signal};
use tokio::sync::Notify;

use super::{CollectionStore, Runtime, Shared};
use crate::config::StoreDefaults;
use crate::features::{FilterFeature, PaginationFeature, SelectionFeature, SortFeature};
use crate::loader::{EntityLoader, LoaderHooks};

/// Composes features into a [`CollectionStore`].
///
/// Features are installed in a fixed order at [`build`](Self::build) time:
/// filter, sort, pagination, selection, then the loader. Unset features keep
/// their defaults: an accept-all local filter, local sort with no initial
/// value, no pagination, no selection and no loader.
pub struct CollectionStoreBuilder<T, F> {
    collection: Option<String>,
    defaults: StoreDefaults,
    filter: Option<FilterFeature<T, F>>,
    initial_filter: Option<F>,
    sort: SortFeature,
    pagination: PaginationFeature,
    selection: SelectionFeature,
    loader: Option<Arc<dyn EntityLoader<T, F>>>,
    hooks: LoaderHooks<T>,
    entities: Vec<T>,
}

impl<T: Entity, F: FilterValue> CollectionStoreBuilder<T, F> {
    pub(crate) fn new() -> Self {
        Self {
            collection: None,
            defaults: StoreDefaults::default(),
            filter: None,
            initial_filter: None,
            sort: SortFeature::default(),
            pagination: PaginationFeature::default(),
            selection: SelectionFeature::default(),
            loader: None,
            hooks: LoaderHooks::default(),
            entities: Vec::new(),
        }
    }

    /// Namespaces the store. The name is passed to the loader and used as the
    /// default URL param prefix and registry key.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Overrides the store defaults.
    #[must_use]
    pub fn defaults(mut self, defaults: StoreDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Installs the filter feature.
    #[must_use]
    pub fn filter(mut self, feature: FilterFeature<T, F>) -> Self {
        self.filter = Some(feature);
        self
    }

    /// Filter value active from construction. Defaults to `F::default()`.
    #[must_use]
    pub fn initial_filter(mut self, filter: F) -> Self {
        self.initial_filter = Some(filter);
        self
    }

    /// Installs the sort feature.
    #[must_use]
    pub fn sort(mut self, feature: SortFeature) -> Self {
        self.sort = feature;
        self
    }

    /// Installs the pagination feature.
    #[must_use]
    pub fn pagination(mut self, feature: PaginationFeature) -> Self {
        self.pagination = feature;
        self
    }

    /// Installs the selection feature.
    #[must_use]
    pub fn selection(mut self, feature: SelectionFeature) -> Self {
        self.selection = feature;
        self
    }

    /// Installs the fetch function run on every transition into loading.
    #[must_use]
    pub fn loader(mut self, loader: impl EntityLoader<T, F>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Hook fired with every applied result.
    #[must_use]
    pub fn on_success(mut self, hook: impl Fn(&FetchResult<T>) + Send + Sync + 'static) -> Self {
        self.hooks.on_success = Some(Arc::new(hook));
        self
    }

    /// Hook fired with every stored error, after mapping.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&LoadError) + Send + Sync + 'static) -> Self {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Maps loader failures into the stored error. Defaults to
    /// [`LoadError::from_anyhow`].
    #[must_use]
    pub fn map_error(
        mut self,
        mapper: impl Fn(&anyhow::Error) -> LoadError + Send + Sync + 'static,
    ) -> Self {
        self.hooks.map_error = Arc::new(mapper);
        self
    }

    /// Entities resident from construction.
    #[must_use]
    pub fn entities(mut self, entities: impl IntoIterator<Item = T>) -> Self {
        self.entities = entities.into_iter().collect();
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> CollectionStore<T, F> {
        let filter = self.initial_filter.unwrap_or_default();
        let paging = self.pagination.initial_state(&self.defaults);
        let state = CollectionState::new(
            filter,
            self.sort.initial(),
            paging,
            self.selection.initial_state(),
        );
        let shared = Shared {
            state: Signal::new(state),
            filter: self
                .filter
                .unwrap_or_else(|| FilterFeature::local(|_: &T, _: &F| true)),
            sort: self.sort,
            selection: self.selection,
            loader: self.loader,
            hooks: self.hooks,
            defaults: self.defaults,
            collection: self.collection,
            runtime: Mutex::new(Runtime::default()),
            default_applied: AtomicBool::new(false),
            settled: Notify::new(),
        };
        let store = CollectionStore {
            shared: Arc::new(shared),
        };
        if !self.entities.is_empty() {
            store.set_all_entities(self.entities);
        }
        store
    }
}
