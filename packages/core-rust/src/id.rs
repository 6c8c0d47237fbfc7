//! Entity identity.
//!
//! Every record held by an [`EntityCollection`](crate::EntityCollection) is
//! addressed by an [`EntityId`]. Ids are either integers or strings, which
//! covers the shapes produced by typical REST backends, and round-trip through
//! JSON and URL query strings without loss.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifier of a single entity.
///
/// Serializes untagged: `Num(5)` as `5`, `Str("a")` as `"a"`.
/// Ordering places all numeric ids before string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Integer identifier.
    Num(i64),
    /// String identifier (UUIDs, slugs, composite keys).
    Str(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Error returned when parsing an empty or blank id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entity id must not be blank")]
pub struct ParseEntityIdError;

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    /// Parses integers as [`EntityId::Num`], everything else as [`EntityId::Str`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseEntityIdError);
        }
        Ok(trimmed
            .parse::<i64>()
            .map_or_else(|_| Self::Str(trimmed.to_string()), Self::Num))
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        Self::Num(i64::from(value))
    }
}

impl From<u32> for EntityId {
    fn from(value: u32) -> Self {
        Self::Num(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A record that can live in an entity collection.
///
/// The `Serialize` bound powers two things: local sorting reads fields by
/// their serialized name through [`Entity::field_value`], and the storage
/// adapters persist snapshots as JSON.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, unique identifier of this entity.
    fn id(&self) -> EntityId;

    /// Returns the value of a field by its serialized name.
    ///
    /// The default implementation serializes the entity to JSON and looks the
    /// field up in the resulting object. Override it for hot sort paths.
    fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map.remove(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        id: i64,
        display_name: String,
    }

    impl Entity for Item {
        fn id(&self) -> EntityId {
            EntityId::Num(self.id)
        }
    }

    #[test]
    fn parse_numeric_and_string_ids() {
        assert_eq!("42".parse::<EntityId>(), Ok(EntityId::Num(42)));
        assert_eq!(
            "abc-1".parse::<EntityId>(),
            Ok(EntityId::Str("abc-1".to_string()))
        );
        assert_eq!(" 7 ".parse::<EntityId>(), Ok(EntityId::Num(7)));
    }

    #[test]
    fn blank_id_is_rejected() {
        assert_eq!("".parse::<EntityId>(), Err(ParseEntityIdError));
        assert_eq!("   ".parse::<EntityId>(), Err(ParseEntityIdError));
    }

    #[test]
    fn display_matches_parse() {
        for id in [EntityId::Num(-3), EntityId::from("sku-9")] {
            assert_eq!(id.to_string().parse::<EntityId>(), Ok(id));
        }
    }

    #[test]
    fn serializes_untagged() {
        assert_eq!(serde_json::to_string(&EntityId::Num(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&EntityId::from("x")).unwrap(), "\"x\"");
        let ids: Vec<EntityId> = serde_json::from_str("[1, \"two\"]").unwrap();
        assert_eq!(ids, vec![EntityId::Num(1), EntityId::from("two")]);
    }

    #[test]
    fn numeric_ids_order_before_strings() {
        assert!(EntityId::Num(1_000) < EntityId::from("a"));
    }

    #[test]
    fn field_value_uses_serialized_names() {
        let item = Item {
            id: 1,
            display_name: "Zelda".to_string(),
        };
        assert_eq!(
            item.field_value("displayName"),
            Some(serde_json::Value::String("Zelda".to_string()))
        );
        assert_eq!(item.field_value("display_name"), None);
    }
}
