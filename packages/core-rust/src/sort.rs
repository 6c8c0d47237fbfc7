//! Sort model and the local stable comparator.
//!
//! # Comparator
//!
//! Field values are read through [`Entity::field_value`] and ranked by JSON
//! type first: missing/null < bool < number < string < array/object. Within
//! a rank numbers compare numerically and strings compare case-insensitively.
//! Arrays and objects compare equal to each other. `desc` reverses the
//! comparator, not the output, so ties keep their prior relative order in
//! both directions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::EntityCollection;
use crate::id::{Entity, EntityId};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Wire name (`"asc"` / `"desc"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a direction is neither `asc` nor `desc`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sort direction: {0}")]
pub struct ParseSortDirectionError(pub String);

impl FromStr for SortDirection {
    type Err = ParseSortDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ParseSortDirectionError(other.to_string())),
        }
    }
}

/// The single active sort of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    /// Serialized field name to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort by `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort by `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Normalized comparison key extracted once per entity.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Missing,
    Bool(bool),
    Number(f64),
    Text(String),
    Composite,
}

impl SortKey {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Bool(b)) => Self::Bool(b),
            Some(Value::Number(n)) => n.as_f64().map_or(Self::Missing, Self::Number),
            Some(Value::String(s)) => Self::Text(s.to_lowercase()),
            Some(Value::Array(_) | Value::Object(_)) => Self::Composite,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Missing => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::Text(_) => 3,
            Self::Composite => 4,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Compares two raw field values with the documented comparator.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    SortKey::from_value(a.cloned()).compare(&SortKey::from_value(b.cloned()))
}

/// Stable-sorts `collection` in place by `sort`.
pub fn sort_collection<T: Entity>(collection: &mut EntityCollection<T>, sort: &Sort) {
    let order = sorted_ids(collection.iter(), sort);
    collection.reorder(&order);
}

/// Returns the ids of `entities` stably sorted by `sort`.
pub fn sorted_ids<'a, T: Entity>(
    entities: impl Iterator<Item = &'a T>,
    sort: &Sort,
) -> Vec<EntityId> {
    let mut keyed: Vec<(EntityId, SortKey)> = entities
        .map(|entity| {
            (
                entity.id(),
                SortKey::from_value(entity.field_value(&sort.field)),
            )
        })
        .collect();
    match sort.direction {
        SortDirection::Asc => keyed.sort_by(|(_, a), (_, b)| a.compare(b)),
        SortDirection::Desc => keyed.sort_by(|(_, a), (_, b)| b.compare(a)),
    }
    keyed.into_iter().map(|(id, _)| id).collect()
}
