//! Fetch requests handed to loaders and the result shapes they may return.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::sort::Sort;

/// Row window requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page the window is anchored at.
    pub page_index: usize,
    /// Absolute index of the first requested row.
    pub start_index: usize,
    /// Number of rows requested.
    pub size: usize,
}

/// Everything a loader needs to serve one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest<F> {
    /// Collection namespace, if the store is namespaced.
    pub collection: Option<String>,
    /// Filter at dispatch time.
    pub filter: F,
    /// Sort at dispatch time.
    pub sort: Option<Sort>,
    /// Requested row window for paged and scroll modes.
    pub page: Option<PageRequest>,
    /// Query generation captured at dispatch, used to detect stale results.
    pub generation: u64,
}

/// A loader's response, in one of the supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    /// Bare array or `{entities}`: replaces the whole set.
    Entities(Vec<T>),
    /// `{entities, total}`: one paged window plus the total row count.
    Page {
        /// Rows of the requested window.
        entities: Vec<T>,
        /// Total rows across all pages.
        total: usize,
    },
    /// `{entities, hasMore}`: a chunk appended to the scroll window.
    Scroll {
        /// Rows of the chunk.
        entities: Vec<T>,
        /// Whether more rows follow.
        has_more: bool,
        /// Total rows, when the backend also reports it.
        total: Option<usize>,
    },
}

#[derive(Deserialize)]
#[serde(untagged, bound = "T: DeserializeOwned")]
enum RawFetchResult<T> {
    Array(Vec<T>),
    Object {
        entities: Vec<T>,
        #[serde(default)]
        total: Option<usize>,
        #[serde(default, rename = "hasMore")]
        has_more: Option<bool>,
    },
}

impl<T> FetchResult<T> {
    /// Normalizes a JSON response of any supported shape.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the value matches no shape.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        Ok(match serde_json::from_value::<RawFetchResult<T>>(value)? {
            RawFetchResult::Array(entities)
            | RawFetchResult::Object {
                entities,
                total: None,
                has_more: None,
            } => Self::Entities(entities),
            RawFetchResult::Object {
                entities,
                total,
                has_more: Some(has_more),
            } => Self::Scroll {
                entities,
                has_more,
                total,
            },
            RawFetchResult::Object {
                entities,
                total: Some(total),
                has_more: None,
            } => Self::Page { entities, total },
        })
    }

    /// The returned rows.
    #[must_use]
    pub fn entities(&self) -> &[T] {
        match self {
            Self::Entities(entities)
            | Self::Page { entities, .. }
            | Self::Scroll { entities, .. } => entities,
        }
    }

    /// Consumes the result, returning its rows.
    #[must_use]
    pub fn into_entities(self) -> Vec<T> {
        match self {
            Self::Entities(entities)
            | Self::Page { entities, .. }
            | Self::Scroll { entities, .. } => entities,
        }
    }

    /// Total row count, if the shape carries one.
    #[must_use]
    pub fn total(&self) -> Option<usize> {
        match self {
            Self::Entities(_) => None,
            Self::Page { total, .. } => Some(*total),
            Self::Scroll { total, .. } => *total,
        }
    }

    /// Explicit `hasMore`, if the shape carries one.
    #[must_use]
    pub fn has_more(&self) -> Option<bool> {
        match self {
            Self::Scroll { has_more, .. } => Some(*has_more),
            _ => None,
        }
    }
}

impl<T> From<Vec<T>> for FetchResult<T> {
    fn from(entities: Vec<T>) -> Self {
        Self::Entities(entities)
    }
}
