//! Debounced filter dispatch.

use std::sync::Arc;

use tessera_core::{
    merge_patch, Entity, FilterInput, FilterRequest, FilterValue, PagingState, PatchError,
};
use tokio::runtime::Handle;
use tracing::debug;

use super::{CollectionStore, PendingFilter, Shared};

impl<T: Entity, F: FilterValue> CollectionStore<T, F> {
    /// Changes the filter.
    ///
    /// The new value takes effect after the request's debounce (or the
    /// store default). A newer request cancels a pending one; patches merge
    /// onto the pending value when there is one, else onto the current
    /// filter. `force_load` applies immediately. `skip_loading_call` stores
    /// the value without re-filtering or reloading.
    ///
    /// Applying a filter moves to page 0, clears the selection (unless the
    /// selection feature opts out) and, for remote changes, invalidates
    /// cached pages and reloads.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] if a patch cannot be merged into the filter
    /// type. Nothing changes in that case.
    pub fn filter_entities(&self, request: FilterRequest<F>) -> Result<(), PatchError> {
        let FilterRequest {
            input,
            debounce,
            force_load,
            skip_loading_call,
        } = request;
        let pending = self
            .shared
            .runtime
            .lock()
            .pending_filter
            .as_ref()
            .map(|pending| pending.value.clone());
        let next = match input {
            FilterInput::Replace(filter) => filter,
            FilterInput::Patch(patch) => {
                let base = pending.unwrap_or_else(|| self.current_filter());
                merge_patch(&base, &patch)?
            }
        };

        if skip_loading_call {
            self.shared.cancel_pending_filter();
            self.shared.state.update(|s| s.filter = next);
            self.shared.settled.notify_waiters();
            return Ok(());
        }

        let delay = debounce.unwrap_or(self.shared.defaults.filter_debounce);
        if force_load || delay.is_zero() {
            self.shared.cancel_pending_filter();
            self.shared.apply_filter(next);
            self.shared.settled.notify_waiters();
            return Ok(());
        }

        let Ok(handle) = Handle::try_current() else {
            debug!("no tokio runtime for the filter debounce, applying immediately");
            self.shared.cancel_pending_filter();
            self.shared.apply_filter(next);
            return Ok(());
        };

        let token = {
            let mut runtime = self.shared.runtime.lock();
            runtime.next_token += 1;
            let token = runtime.next_token;
            runtime.pending_filter = Some(PendingFilter { token, value: next });
            if let Some(timer) = runtime.filter_timer.take() {
                timer.abort();
            }
            token
        };
        let shared = Arc::clone(&self.shared);
        let timer = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_filter(token);
        });
        let mut runtime = self.shared.runtime.lock();
        if runtime
            .pending_filter
            .as_ref()
            .is_some_and(|pending| pending.token == token)
        {
            runtime.filter_timer = Some(timer);
        }
        Ok(())
    }

    /// Whether a debounced filter is waiting to be applied.
    #[must_use]
    pub fn has_pending_filter(&self) -> bool {
        self.shared.runtime.lock().pending_filter.is_some()
    }
}

impl<T: Entity, F: FilterValue> Shared<T, F> {
    fn cancel_pending_filter(&self) {
        let mut runtime = self.runtime.lock();
        if let Some(timer) = runtime.filter_timer.take() {
            timer.abort();
        }
        if runtime.pending_filter.take().is_some() {
            debug!(collection = ?self.collection, "pending filter superseded");
        }
    }

    fn fire_filter(self: &Arc<Self>, token: u64) {
        let value = {
            let mut runtime = self.runtime.lock();
            match runtime.pending_filter.take() {
                Some(pending) if pending.token == token => {
                    runtime.filter_timer = None;
                    Some(pending.value)
                }
                other => {
                    runtime.pending_filter = other;
                    None
                }
            }
        };
        if let Some(value) = value {
            self.apply_filter(value);
        }
        self.settled.notify_waiters();
    }

    /// Applies `value` and its side effects in one state update, then reloads
    /// if the change is remote.
    pub(super) fn apply_filter(self: &Arc<Self>, value: F) {
        let (remote, fetch) = self.state.update(|s| {
            let remote = self.filter.is_remote_change(&s.applied_filter, &value);
            s.filter = value.clone();
            s.applied_filter = value;
            if self.selection.clear_on_filter {
                s.selection.clear();
            }
            if remote {
                let dropped = s.paging.reset(true);
                s.entities.remove_many(&dropped);
                s.generation += 1;
                if matches!(s.paging, PagingState::Remote(_)) {
                    s.entities.clear();
                }
                return (true, true);
            }
            let fetch = self.rewind_remote_page(s);
            s.paging.reset(false);
            (false, fetch)
        });
        debug!(collection = ?self.collection, remote, "filter applied");
        if fetch {
            self.request_reload();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tessera_core::{EntityId, FetchRequest, FetchResult};

    use super::*;
    use crate::features::{FilterFeature, PaginationFeature, SelectionFeature};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct City {
        id: i64,
        name: String,
        country: String,
    }

    impl Entity for City {
        fn id(&self) -> EntityId {
            EntityId::Num(self.id)
        }
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct CityFilter {
        search: String,
        country: String,
    }

    fn cities() -> Vec<City> {
        [
            ("Lisbon", "PT"),
            ("Porto", "PT"),
            ("Paris", "FR"),
            ("Lyon", "FR"),
            ("Lille", "FR"),
        ]
        .iter()
        .zip(1..)
        .map(|((name, country), id)| City {
            id,
            name: (*name).to_string(),
            country: (*country).to_string(),
        })
        .collect()
    }

    fn matches(city: &City, filter: &CityFilter) -> bool {
        city.name.to_lowercase().contains(&filter.search.to_lowercase())
            && (filter.country.is_empty() || city.country == filter.country)
    }

    fn local_store() -> CollectionStore<City, CityFilter> {
        CollectionStore::builder()
            .filter(FilterFeature::local(matches))
            .pagination(PaginationFeature::local(2))
            .selection(SelectionFeature::multi())
            .entities(cities())
            .build()
    }

    fn names(store: &CollectionStore<City, CityFilter>) -> Vec<String> {
        store.visible_entities().into_iter().map(|c| c.name).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_applies_only_the_last_value() {
        let store = local_store();
        store
            .filter_entities(FilterRequest::new(CityFilter {
                search: "l".into(),
                ..CityFilter::default()
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(names(&store).len(), 5);
        store
            .filter_entities(FilterRequest::new(CityFilter {
                search: "ly".into(),
                ..CityFilter::default()
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.has_pending_filter());
        assert_eq!(store.current_filter().search, "");
        store.settled().await;
        assert_eq!(names(&store), vec!["Lyon"]);
        assert_eq!(store.current_filter().search, "ly");
    }

    #[tokio::test(start_paused = true)]
    async fn patches_accumulate_on_the_pending_value() {
        let store = local_store();
        store
            .filter_entities(FilterRequest::patch(json!({ "country": "FR" })))
            .unwrap();
        store
            .filter_entities(FilterRequest::patch(json!({ "search": "li" })))
            .unwrap();
        store.settled().await;
        assert_eq!(
            store.current_filter(),
            CityFilter {
                search: "li".into(),
                country: "FR".into(),
            }
        );
        assert_eq!(names(&store), vec!["Lille"]);
    }

    #[test]
    fn force_load_resets_page_and_selection() {
        let store = local_store();
        store.load_entities_page(1);
        store.select_entities(vec![EntityId::Num(1), EntityId::Num(3)]);
        store
            .filter_entities(
                FilterRequest::new(CityFilter {
                    country: "FR".into(),
                    ..CityFilter::default()
                })
                .force_load(),
            )
            .unwrap();
        assert_eq!(store.page_info().page_index, 0);
        assert!(store.selected_ids().is_empty());
        assert_eq!(names(&store), vec!["Paris", "Lyon", "Lille"]);
    }

    #[test]
    fn skip_loading_call_only_stores_the_value() {
        let store = local_store();
        store.load_entities_page(1);
        store
            .filter_entities(
                FilterRequest::new(CityFilter {
                    search: "paris".into(),
                    ..CityFilter::default()
                })
                .skip_loading_call(),
            )
            .unwrap();
        assert_eq!(store.current_filter().search, "paris");
        assert_eq!(names(&store).len(), 5);
        assert_eq!(store.page_info().page_index, 1);
    }

    #[test]
    fn bad_patch_changes_nothing() {
        let store = local_store();
        let err = store
            .filter_entities(FilterRequest::patch(json!(["not", "an", "object"])))
            .unwrap_err();
        assert!(matches!(err, PatchError::NotAnObject));
        assert_eq!(store.current_filter(), CityFilter::default());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_filter_reloads_with_the_new_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let store: CollectionStore<City, CityFilter> = CollectionStore::builder()
            .filter(FilterFeature::remote())
            .loader(move |request: FetchRequest<CityFilter>| {
                sink.lock().push(request.filter.clone());
                async move {
                    let rows = cities()
                        .into_iter()
                        .filter(|city| matches(city, &request.filter))
                        .collect::<Vec<_>>();
                    Ok::<_, anyhow::Error>(FetchResult::Entities(rows))
                }
            })
            .build();
        store.set_loading();
        store.settled().await;
        assert_eq!(store.entities().len(), 5);

        store
            .filter_entities(FilterRequest::new(CityFilter {
                country: "PT".into(),
                ..CityFilter::default()
            }))
            .unwrap();
        store.settled().await;
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(names(&store), vec!["Lisbon", "Porto"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_filter_only_reloads_on_remote_fields() {
        let calls = Arc::new(Mutex::new(0_usize));
        let counter = Arc::clone(&calls);
        let store: CollectionStore<City, CityFilter> = CollectionStore::builder()
            .filter(FilterFeature::hybrid(
                matches,
                |previous: &CityFilter, next: &CityFilter| previous.country != next.country,
            ))
            .loader(move |request: FetchRequest<CityFilter>| {
                *counter.lock() += 1;
                async move {
                    let rows = cities()
                        .into_iter()
                        .filter(|city| {
                            request.filter.country.is_empty()
                                || city.country == request.filter.country
                        })
                        .collect::<Vec<_>>();
                    Ok::<_, anyhow::Error>(FetchResult::Entities(rows))
                }
            })
            .build();
        store.set_loading();
        store.settled().await;

        store
            .filter_entities(
                FilterRequest::new(CityFilter {
                    search: "p".into(),
                    ..CityFilter::default()
                })
                .force_load(),
            )
            .unwrap();
        store.settled().await;
        assert_eq!(*calls.lock(), 1);
        assert_eq!(names(&store), vec!["Porto", "Paris"]);

        store
            .filter_entities(FilterRequest::patch(json!({ "country": "FR" })).force_load())
            .unwrap();
        store.settled().await;
        assert_eq!(*calls.lock(), 2);
        assert_eq!(store.entities().len(), 3);
        assert_eq!(names(&store), vec!["Paris"]);
    }
}
