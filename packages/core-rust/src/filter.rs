//! Filter values, filter requests and partial-filter patching.

use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Bound alias for filter values.
///
/// Filters are opaque to the engine: they are compared structurally, sent to
/// the loader, merged with JSON patches and persisted to query params/storage.
pub trait FilterValue:
    Clone + PartialEq + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> FilterValue for T where
    T: Clone + PartialEq + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Errors from [`merge_patch`].
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The current filter or the patch is not a JSON object.
    #[error("filter patches require object-shaped filters")]
    NotAnObject,
    /// The merged value no longer deserializes into the filter type.
    #[error("patched filter is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Shallow-merges the top-level keys of `patch` onto `base`.
///
/// # Errors
///
/// Returns [`PatchError::NotAnObject`] if either side is not a JSON object,
/// or [`PatchError::Invalid`] if the merged object does not deserialize.
pub fn merge_patch<F: FilterValue>(base: &F, patch: &Value) -> Result<F, PatchError> {
    let Value::Object(changes) = patch else {
        return Err(PatchError::NotAnObject);
    };
    let Value::Object(mut merged) = serde_json::to_value(base)? else {
        return Err(PatchError::NotAnObject);
    };
    for (key, value) in changes {
        merged.insert(key.clone(), value.clone());
    }
    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// New filter content: either a full value or a partial JSON patch.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInput<F> {
    /// Replace the filter.
    Replace(F),
    /// Merge these keys onto the latest (pending or current) filter.
    Patch(Value),
}

/// A request to change the filter of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest<F> {
    /// The new filter content.
    pub input: FilterInput<F>,
    /// Debounce override. `None` uses the store default; zero applies at once.
    pub debounce: Option<Duration>,
    /// Apply immediately, bypassing the debounce.
    pub force_load: bool,
    /// Store the value without re-filtering or reloading.
    pub skip_loading_call: bool,
}

impl<F> FilterRequest<F> {
    /// Replaces the filter with `filter`.
    pub fn new(filter: F) -> Self {
        Self::from_input(FilterInput::Replace(filter))
    }

    /// Merges `patch` onto the latest filter.
    #[must_use]
    pub fn patch(patch: Value) -> Self {
        Self::from_input(FilterInput::Patch(patch))
    }

    fn from_input(input: FilterInput<F>) -> Self {
        Self {
            input,
            debounce: None,
            force_load: false,
            skip_loading_call: false,
        }
    }

    /// Overrides the debounce window.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// Applies without waiting for the debounce.
    #[must_use]
    pub fn force_load(mut self) -> Self {
        self.force_load = true;
        self
    }

    /// Stores the value without triggering a re-filter or reload.
    #[must_use]
    pub fn skip_loading_call(mut self) -> Self {
        self.skip_loading_call = true;
        self
    }
}
