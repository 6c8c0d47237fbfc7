//! Loading orchestrator: the call-status state machine and fetch dispatch.
//!
//! A transition into `Loading` dispatches the loader on the ambient tokio
//! runtime with the query captured at dispatch time. At most one fetch per
//! store is in flight; requests arriving meanwhile are coalesced into a
//! single follow-up fetch. A completion whose generation no longer matches
//! the state is stale and is discarded.

use std::sync::Arc;

use tessera_core::scroll::derive_has_more;
use tessera_core::{
    CallStatus, CallStatusError, CollectionState, Entity, FetchRequest, FetchResult, FilterValue,
    LoadError, PageInfo, PageRequest, PagingState,
};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{prune_selection, CollectionStore, Shared};

/// Context captured when a fetch is dispatched.
#[derive(Debug, Clone, Copy)]
pub(super) struct Ticket {
    generation: u64,
    page: Option<PageRequest>,
}

enum Outcome<T> {
    Applied(Option<FetchResult<T>>),
    Failed(LoadError),
    Stale,
    Abandoned,
}

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Enters `Loading` and dispatches the loader, if one is installed.
    ///
    /// Returns `false` when a load is already in progress; the call is then
    /// coalesced into the running one. Without a loader the status is only
    /// moved, and [`set_loaded`](Self::set_loaded) or
    /// [`set_error`](Self::set_error) complete it.
    pub fn set_loading(&self) -> bool {
        let started = self.shared.state.update(|s| s.call_status.begin_loading());
        if !started {
            debug!(collection = ?self.shared.collection, "load already in progress, coalescing");
            return false;
        }
        if self.shared.loader.is_some() {
            self.shared.start_fetch();
        }
        true
    }

    /// Marks the load as finished.
    ///
    /// # Errors
    ///
    /// Returns [`CallStatusError`] when the current status cannot move to
    /// `Loaded` (from `Error`).
    pub fn set_loaded(&self) -> Result<(), CallStatusError> {
        let result = self
            .shared
            .state
            .update(|s| s.call_status.transition(CallStatus::Loaded));
        self.shared.settled.notify_waiters();
        result
    }

    /// Stores a failure.
    ///
    /// # Errors
    ///
    /// Returns [`CallStatusError`] unless a load is in progress.
    pub fn set_error(&self, error: LoadError) -> Result<(), CallStatusError> {
        let result = self
            .shared
            .state
            .update(|s| s.call_status.transition(CallStatus::Error(error)));
        self.shared.settled.notify_waiters();
        result
    }

    /// Back to `Idle`. An in-flight fetch is left to finish and its result
    /// is dropped.
    pub fn reset_call_status(&self) {
        self.shared
            .state
            .update(|s| s.call_status = CallStatus::Idle);
        self.shared.settled.notify_waiters();
    }

    /// Current call status.
    #[must_use]
    pub fn call_status(&self) -> CallStatus {
        self.shared.state.with(|s| s.call_status.clone())
    }

    /// Whether a load is in progress.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.with(|s| s.call_status.is_loading())
    }

    /// Whether the last load succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.shared.state.with(|s| s.call_status.is_loaded())
    }

    /// The stored error, if the last load failed.
    #[must_use]
    pub fn error(&self) -> Option<LoadError> {
        self.shared.state.with(|s| s.call_status.error().cloned())
    }

    /// Resolves once no fetch is in flight and no debounced filter is
    /// pending.
    pub async fn settled(&self) {
        loop {
            let notified = self.shared.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.shared.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

impl<T: Entity, F: FilterValue> Shared<T, F> {
    pub(super) fn is_busy(&self) -> bool {
        let runtime = self.runtime.lock();
        runtime.in_flight || runtime.pending_filter.is_some()
    }

    /// Reloads after a query change. Without a loader there is nothing to
    /// fetch and the call is ignored.
    pub(super) fn request_reload(self: &Arc<Self>) {
        if self.loader.is_none() {
            debug!(collection = ?self.collection, "query changed but no loader is installed");
            return;
        }
        self.start_fetch();
    }

    /// Dispatches a fetch for the current query, or coalesces into the one in
    /// flight. Status, bookkeeping and the captured request are updated in a
    /// single state update.
    fn start_fetch(self: &Arc<Self>) {
        let dispatch = self.state.update(|s| {
            if !s.call_status.is_loading() {
                s.call_status = CallStatus::Loading;
            }
            let mut runtime = self.runtime.lock();
            if runtime.in_flight {
                runtime.reload_requested = true;
                None
            } else {
                runtime.in_flight = true;
                Some(build_request(s, self.collection.clone()))
            }
        });
        match dispatch {
            Some((request, ticket)) => self.spawn_fetch(request, ticket),
            None => debug!(collection = ?self.collection, "fetch in flight, reload queued"),
        }
    }

    fn spawn_fetch(self: &Arc<Self>, request: FetchRequest<F>, ticket: Ticket) {
        let Some(loader) = self.loader.clone() else {
            return;
        };
        debug!(
            collection = ?self.collection,
            generation = ticket.generation,
            page = ?ticket.page,
            "dispatching fetch"
        );
        match Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move {
                    let result = loader.fetch(request).await;
                    shared.complete(ticket, result);
                });
            }
            Err(err) => {
                warn!(collection = ?self.collection, %err, "no tokio runtime to run the loader");
                self.complete(
                    ticket,
                    Err(anyhow::anyhow!("no async runtime available to run the loader")),
                );
            }
        }
    }

    fn complete(self: &Arc<Self>, ticket: Ticket, result: anyhow::Result<FetchResult<T>>) {
        let keep_result = self.hooks.on_success.is_some();
        let (outcome, next) = self.state.update(|s| {
            let mut runtime = self.runtime.lock();
            if !s.call_status.is_loading() {
                runtime.in_flight = false;
                runtime.reload_requested = false;
                return (Outcome::Abandoned, None);
            }
            let redispatch = std::mem::take(&mut runtime.reload_requested);
            runtime.in_flight = redispatch;
            drop(runtime);

            let mut next = redispatch.then(|| build_request(s, self.collection.clone()));
            if s.generation != ticket.generation {
                if !redispatch {
                    s.call_status = CallStatus::Loaded;
                }
                return (Outcome::Stale, next);
            }
            let outcome = match result {
                Ok(result) => {
                    let copy = keep_result.then(|| result.clone());
                    if self.apply_result(s, ticket, result) {
                        self.runtime.lock().in_flight = true;
                        next = Some(build_request(s, self.collection.clone()));
                    }
                    if next.is_none() {
                        s.call_status = CallStatus::Loaded;
                    }
                    Outcome::Applied(copy)
                }
                Err(err) => {
                    let mapped = (self.hooks.map_error)(&err);
                    debug!(collection = ?self.collection, error = %err, "fetch failed");
                    if !redispatch {
                        s.call_status = CallStatus::Error(mapped.clone());
                    }
                    Outcome::Failed(mapped)
                }
            };
            (outcome, next)
        });

        match outcome {
            Outcome::Applied(result) => {
                if let (Some(hook), Some(result)) = (&self.hooks.on_success, result) {
                    hook(&result);
                }
            }
            Outcome::Failed(error) => {
                if let Some(hook) = &self.hooks.on_error {
                    hook(&error);
                }
            }
            Outcome::Stale => {
                debug!(
                    collection = ?self.collection,
                    generation = ticket.generation,
                    "discarding stale fetch result"
                );
            }
            Outcome::Abandoned => {
                debug!(collection = ?self.collection, "load was reset, dropping result");
            }
        }

        match next {
            Some((request, ticket)) => self.spawn_fetch(request, ticket),
            None => self.settled.notify_waiters(),
        }
    }

    /// Writes a result through the mutation matching the paging mode.
    ///
    /// Remote paging seeds the page cache, scroll appends to the window and
    /// every other mode replaces the whole set. Returns `true` when the
    /// current page fell out of range of the reported total and page 0 still
    /// has to be fetched.
    fn apply_result(
        &self,
        s: &mut CollectionState<T, F>,
        ticket: Ticket,
        result: FetchResult<T>,
    ) -> bool {
        let refetch = match &mut s.paging {
            PagingState::Remote(paged) => {
                let request = ticket.page.unwrap_or(PageRequest {
                    page_index: paged.page_index,
                    start_index: paged.page_index * paged.page_size,
                    size: paged.page_size,
                });
                let total = result.total();
                let entities = result.into_entities();
                let received = entities.len();
                paged.total = total
                    .or_else(|| (received < request.size).then_some(request.start_index + received))
                    .or(paged.total);
                paged.seed(request.page_index, entities);
                let mut refetch = false;
                if let Some(total) = paged.total {
                    if !PageInfo::is_valid_page(paged.page_index, paged.page_size, total) {
                        debug!(
                            collection = ?self.collection,
                            page_index = paged.page_index,
                            total,
                            "page out of range, returning to the first page"
                        );
                        paged.page_index = 0;
                        refetch = !paged.cache.contains(0);
                    }
                }
                let rows = paged
                    .cache
                    .get(paged.page_index)
                    .map(<[T]>::to_vec)
                    .unwrap_or_default();
                s.entities.set_all(rows);
                refetch
            }
            PagingState::Scroll(window) => {
                let page = ticket.page.map_or(window.request_page, |p| p.page_index);
                let explicit = result.has_more();
                let total = result.total();
                let entities = result.into_entities();
                let received = entities.len();
                let ids = entities.iter().map(Entity::id).collect();
                s.entities.upsert_many(entities);
                let evicted = window.push_page(page, ids);
                s.entities.remove_many(&evicted);
                window.has_more =
                    derive_has_more(explicit, received, window.page_size, total, window.end());
                false
            }
            PagingState::Disabled | PagingState::Local { .. } => {
                s.entities.set_all(result.into_entities());
                prune_selection(s);
                false
            }
        };
        self.entities_changed(s);
        refetch
    }
}

/// Builds the loader request for the current query.
fn build_request<T: Entity, F: FilterValue>(
    s: &CollectionState<T, F>,
    collection: Option<String>,
) -> (FetchRequest<F>, Ticket) {
    let page = match &s.paging {
        PagingState::Disabled | PagingState::Local { .. } => None,
        PagingState::Remote(paged) => {
            let (start_index, size) = paged.request_window(paged.page_index);
            Some(PageRequest {
                page_index: paged.page_index,
                start_index,
                size,
            })
        }
        PagingState::Scroll(window) => Some(PageRequest {
            page_index: window.request_page,
            start_index: window.request_page * window.page_size,
            size: window.page_size,
        }),
    };
    let ticket = Ticket {
        generation: s.generation,
        page,
    };
    let request = FetchRequest {
        collection,
        filter: s.filter.clone(),
        sort: s.sort.clone(),
        page,
        generation: s.generation,
    };
    (request, ticket)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tessera_core::EntityId;

    use super::*;
    use crate::features::PaginationFeature;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
    }

    impl Entity for Item {
        fn id(&self) -> EntityId {
            EntityId::Num(self.id)
        }
    }

    fn items(range: std::ops::Range<i64>) -> Vec<Item> {
        range.map(|id| Item { id }).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn bare_array_replaces_the_set() {
        let store: CollectionStore<Item, String> = CollectionStore::builder()
            .loader(|_request: FetchRequest<String>| async {
                Ok::<_, anyhow::Error>(FetchResult::Entities(items(0..4)))
            })
            .build();
        assert!(store.set_loading());
        assert!(store.is_loading());
        store.settled().await;
        assert!(store.is_loaded());
        assert_eq!(store.entities().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn second_set_loading_is_coalesced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store: CollectionStore<Item, String> = CollectionStore::builder()
            .loader(move |_request: FetchRequest<String>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, anyhow::Error>(FetchResult::Entities(items(0..2)))
                }
            })
            .build();
        assert!(store.set_loading());
        assert!(!store.set_loading());
        store.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_mapped_and_reported() {
        let reported = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&reported);
        let store: CollectionStore<Item, String> = CollectionStore::builder()
            .loader(|_request: FetchRequest<String>| async {
                Err::<FetchResult<Item>, _>(anyhow::anyhow!("backend down"))
            })
            .map_error(|err| LoadError::new(format!("mapped: {err}")))
            .on_error(move |error| *sink.lock() = Some(error.clone()))
            .build();
        store.set_loading();
        store.settled().await;
        let error = store.error().unwrap();
        assert_eq!(error.message, "mapped: backend down");
        assert_eq!(reported.lock().clone(), Some(error));
        assert!(store.set_loaded().is_err());
        assert!(store.set_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn on_success_sees_the_raw_result() {
        let totals = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&totals);
        let store: CollectionStore<Item, String> = CollectionStore::builder()
            .pagination(PaginationFeature::remote_paged(5, 2))
            .loader(|request: FetchRequest<String>| async move {
                let page = request.page.unwrap();
                let start = i64::try_from(page.start_index).unwrap();
                let size = i64::try_from(page.size).unwrap();
                Ok::<_, anyhow::Error>(FetchResult::Page {
                    entities: items(start..start + size),
                    total: 23,
                })
            })
            .on_success(move |result| sink.lock().push(result.total()))
            .build();
        store.set_loading();
        store.settled().await;
        assert_eq!(*totals.lock(), vec![Some(23)]);
        let page = store.current_page();
        assert_eq!(page.entities.len(), 5);
        assert_eq!(page.info.pages_count, 5);
    }

    #[test]
    fn manual_status_without_loader() {
        let store: CollectionStore<Item, String> = CollectionStore::builder().build();
        assert!(store.set_loading());
        assert!(!store.set_loading());
        store.set_loaded().unwrap();
        assert!(store.is_loaded());
        assert!(store.set_error(LoadError::new("late")).is_err());
        store.reset_call_status();
        assert_eq!(store.call_status(), CallStatus::Idle);
    }
}
