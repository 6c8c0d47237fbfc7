//! Mapping between collection query state and URL query parameters.
//!
//! # Schema
//!
//! | key             | value                               |
//! |-----------------|-------------------------------------|
//! | `filter`        | JSON-encoded filter                 |
//! | `sortBy`        | sort field                          |
//! | `sortDirection` | `asc` or `desc`                     |
//! | `page`          | 1-based page number                 |
//! | `selectedId`    | selected entity id                  |
//!
//! Every key may carry a `"<prefix>-"` namespace. Values that fail to parse
//! are dropped rather than reported: a hand-edited URL degrades to defaults.

use std::collections::BTreeMap;

use tracing::debug;

use crate::filter::FilterValue;
use crate::id::EntityId;
use crate::sort::{Sort, SortDirection};

/// Unprefixed name of the filter parameter.
pub const FILTER_PARAM: &str = "filter";
/// Unprefixed name of the sort field parameter.
pub const SORT_BY_PARAM: &str = "sortBy";
/// Unprefixed name of the sort direction parameter.
pub const SORT_DIRECTION_PARAM: &str = "sortDirection";
/// Unprefixed name of the 1-based page parameter.
pub const PAGE_PARAM: &str = "page";
/// Unprefixed name of the selected id parameter.
pub const SELECTED_ID_PARAM: &str = "selectedId";

/// Resolves parameter names for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParamKeys {
    prefix: Option<String>,
}

impl QueryParamKeys {
    /// Keys namespaced with `"<prefix>-"` when a non-empty prefix is given.
    #[must_use]
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Full parameter name for `name`.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}-{name}"),
            None => name.to_string(),
        }
    }
}

/// The subset of collection state mirrored into the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParamsState<F> {
    /// Filter value.
    pub filter: Option<F>,
    /// Active sort.
    pub sort: Option<Sort>,
    /// Zero-based page index.
    pub page_index: Option<usize>,
    /// Selected id (single selection).
    pub selected_id: Option<EntityId>,
}

impl<F> Default for QueryParamsState<F> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            page_index: None,
            selected_id: None,
        }
    }
}

impl<F> QueryParamsState<F> {
    /// Whether no parameter was recognized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filter.is_none()
            && self.sort.is_none()
            && self.page_index.is_none()
            && self.selected_id.is_none()
    }
}

/// Encodes state into parameter changes.
///
/// Every managed key is present in the output; `None` means "remove this
/// parameter". Defaults (default filter, first page) are encoded as removals
/// to keep URLs short.
pub fn encode_query_params<F: FilterValue>(
    keys: &QueryParamKeys,
    state: &QueryParamsState<F>,
) -> BTreeMap<String, Option<String>> {
    let mut params = BTreeMap::new();
    let filter = state
        .filter
        .as_ref()
        .filter(|filter| **filter != F::default())
        .and_then(|filter| serde_json::to_string(filter).ok());
    params.insert(keys.key(FILTER_PARAM), filter);
    params.insert(
        keys.key(SORT_BY_PARAM),
        state.sort.as_ref().map(|sort| sort.field.clone()),
    );
    params.insert(
        keys.key(SORT_DIRECTION_PARAM),
        state
            .sort
            .as_ref()
            .map(|sort| sort.direction.as_str().to_string()),
    );
    params.insert(
        keys.key(PAGE_PARAM),
        state
            .page_index
            .filter(|index| *index > 0)
            .map(|index| (index + 1).to_string()),
    );
    params.insert(
        keys.key(SELECTED_ID_PARAM),
        state.selected_id.as_ref().map(ToString::to_string),
    );
    params
}

/// Decodes parameters, dropping anything malformed.
pub fn decode_query_params<F: FilterValue>(
    keys: &QueryParamKeys,
    params: &BTreeMap<String, String>,
) -> QueryParamsState<F> {
    let read = |name: &str| params.get(&keys.key(name)).map(String::as_str);

    let filter = read(FILTER_PARAM).and_then(|raw| match serde_json::from_str::<F>(raw) {
        Ok(filter) => Some(filter),
        Err(err) => {
            debug!(param = FILTER_PARAM, %err, "ignoring unparseable filter param");
            None
        }
    });

    let sort = read(SORT_BY_PARAM)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let direction = read(SORT_DIRECTION_PARAM)
                .and_then(|raw| raw.parse::<SortDirection>().ok())
                .unwrap_or_default();
            Sort {
                field: field.to_string(),
                direction,
            }
        });

    let page_index = read(PAGE_PARAM).and_then(|raw| match raw.parse::<usize>() {
        Ok(page) if page >= 1 => Some(page - 1),
        _ => {
            debug!(param = PAGE_PARAM, raw, "ignoring invalid page param");
            None
        }
    });

    let selected_id = read(SELECTED_ID_PARAM).and_then(|raw| raw.parse::<EntityId>().ok());

    QueryParamsState {
        filter,
        sort,
        page_index,
        selected_id,
    }
}
