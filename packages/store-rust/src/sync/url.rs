//! URL query-param sync.
//!
//! On attach, params are read once, decoded (malformed values dropped) and
//! applied to the store, after which the `on_query_params_loaded` hook runs.
//! From then on every store change is encoded and, after a debounce, merged
//! into the host's params. Params the store does not manage are never
//! touched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tessera_core::query_params::{
    decode_query_params, encode_query_params, FILTER_PARAM, PAGE_PARAM, SELECTED_ID_PARAM,
    SORT_BY_PARAM, SORT_DIRECTION_PARAM,
};
use tessera_core::{
    CollectionState, Entity, FilterValue, QueryParamKeys, QueryParamsState, Subscription,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{QueryParamFields, UrlSyncConfig};
use crate::store::{query_state_of, CollectionStore};

/// Param changes: `None` removes the key.
pub type ParamChanges = BTreeMap<String, Option<String>>;

/// The owner of the current URL's query params.
pub trait QueryParamsHost: Send + Sync + 'static {
    /// Current params.
    fn query_params(&self) -> BTreeMap<String, String>;

    /// Applies `changes` on top of the current params, leaving other keys
    /// alone.
    fn merge_query_params(&self, changes: ParamChanges);
}

/// In-memory params, for tests and headless hosts.
#[derive(Debug, Default)]
pub struct MemoryQueryParams {
    params: RwLock<BTreeMap<String, String>>,
    writes: RwLock<usize>,
}

impl MemoryQueryParams {
    /// Empty params.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Params parsed from `key=value` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let params = pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            params: RwLock::new(params),
            writes: RwLock::new(0),
        }
    }

    /// Value of one param.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.params.read().get(key).cloned()
    }

    /// Number of merges applied.
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self.writes.read()
    }
}

impl QueryParamsHost for MemoryQueryParams {
    fn query_params(&self) -> BTreeMap<String, String> {
        self.params.read().clone()
    }

    fn merge_query_params(&self, changes: ParamChanges) {
        let mut params = self.params.write();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    params.insert(key, value);
                }
                None => {
                    params.remove(&key);
                }
            }
        }
        *self.writes.write() += 1;
    }
}

/// Keeps a store and the host's query params in step.
///
/// Dropping it unsubscribes, which closes the write channel; a pending
/// debounced write is flushed before the writer task exits.
pub struct UrlSync {
    _subscription: Subscription,
    _writer: Option<JoinHandle<()>>,
}

impl UrlSync {
    /// Restores the store from the host's params and starts mirroring.
    pub fn attach<T, F, H>(
        store: &CollectionStore<T, F>,
        host: Arc<H>,
        config: UrlSyncConfig,
    ) -> Self
    where
        T: Entity,
        F: FilterValue,
        H: QueryParamsHost,
    {
        Self::attach_with_hook(store, host, config, |_| {})
    }

    /// Like [`attach`](Self::attach), running `on_query_params_loaded` once
    /// the store reflects the restored params.
    pub fn attach_with_hook<T, F, H>(
        store: &CollectionStore<T, F>,
        host: Arc<H>,
        config: UrlSyncConfig,
        on_query_params_loaded: impl FnOnce(&CollectionStore<T, F>),
    ) -> Self
    where
        T: Entity,
        F: FilterValue,
        H: QueryParamsHost,
    {
        let prefix = config
            .prefix
            .clone()
            .or_else(|| store.collection().map(str::to_string));
        let keys = QueryParamKeys::new(prefix.as_deref());
        let fields = config.fields;

        let decoded: QueryParamsState<F> = decode_query_params(&keys, &host.query_params());
        let restored = mask(decoded, fields);
        if !restored.is_empty() {
            debug!(collection = ?store.collection(), "restoring state from query params");
            store.restore_query(restored);
        }
        on_query_params_loaded(store);

        let initial = store.with_state(|s| encode(&keys, s, fields));
        let outdated = outdated(&host.query_params(), &initial);
        if !outdated.is_empty() {
            debug!(collection = ?store.collection(), "rewriting ignored query params");
            host.merge_query_params(outdated);
        }
        let delay = config
            .write_debounce
            .unwrap_or(store.defaults().url_write_debounce);

        match Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = watch::channel(initial.clone());
                let subscription = store.subscribe(move |s| {
                    let params = encode(&keys, s, fields);
                    tx.send_if_modified(|current| {
                        if *current == params {
                            false
                        } else {
                            *current = params;
                            true
                        }
                    });
                });
                let writer = handle.spawn(write_debounced(rx, host, initial, delay));
                Self {
                    _subscription: subscription,
                    _writer: Some(writer),
                }
            }
            Err(_) => {
                debug!("no tokio runtime, writing query params without debounce");
                let last = Arc::new(RwLock::new(initial));
                let subscription = store.subscribe(move |s| {
                    let params = encode(&keys, s, fields);
                    let mut last = last.write();
                    if *last != params {
                        host.merge_query_params(params.clone());
                        *last = params;
                    }
                });
                Self {
                    _subscription: subscription,
                    _writer: None,
                }
            }
        }
    }
}

/// Entries of `target` that `params` does not already hold.
fn outdated(params: &BTreeMap<String, String>, target: &ParamChanges) -> ParamChanges {
    target
        .iter()
        .filter(|(key, value)| params.get(*key) != value.as_ref())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

async fn write_debounced<H: QueryParamsHost>(
    mut rx: watch::Receiver<ParamChanges>,
    host: Arc<H>,
    mut last: ParamChanges,
    delay: Duration,
) {
    while rx.changed().await.is_ok() {
        loop {
            tokio::select! {
                () = tokio::time::sleep(delay) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        let params = rx.borrow_and_update().clone();
        if params != last {
            host.merge_query_params(params.clone());
            last = params;
        }
    }
}

fn mask<F>(mut state: QueryParamsState<F>, fields: QueryParamFields) -> QueryParamsState<F> {
    if !fields.filter {
        state.filter = None;
    }
    if !fields.sort {
        state.sort = None;
    }
    if !fields.page {
        state.page_index = None;
    }
    if !fields.selected_id {
        state.selected_id = None;
    }
    state
}

/// Encodes the managed params of `s`. Unmanaged fields are left out
/// entirely so they are neither written nor removed.
fn encode<T, F: FilterValue>(
    keys: &QueryParamKeys,
    s: &CollectionState<T, F>,
    fields: QueryParamFields,
) -> ParamChanges {
    let mut params = encode_query_params(keys, &query_state_of(s));
    let managed = [
        (fields.filter, FILTER_PARAM),
        (fields.sort, SORT_BY_PARAM),
        (fields.sort, SORT_DIRECTION_PARAM),
        (fields.page, PAGE_PARAM),
        (fields.selected_id, SELECTED_ID_PARAM),
    ];
    for (enabled, name) in managed {
        if !enabled {
            params.remove(&keys.key(name));
        }
    }
    params
}
