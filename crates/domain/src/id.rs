//! Identifiers: UUID-backed newtypes for runtime handles and the validated
//! `<domain>.<object_id>` entity identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Identifies one subscription registered on the state bus.
    SubscriptionId
);

define_id!(
    /// Identifies one state-change event.
    EventId
);

/// Reason an entity identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity id `{0}`, expected `<domain>.<object_id>`")]
pub struct InvalidEntityId(pub String);

/// Identifier of an entity on the state bus, e.g. `binary_sensor.kitchen`.
///
/// Both halves are made of lowercase ASCII letters, digits and underscores,
/// and neither starts or ends with an underscore nor contains `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an entity identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityId`] when `value` is not `<domain>.<object_id>`.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidEntityId> {
        let value = value.into();
        match value.split_once('.') {
            Some((domain, object_id)) if is_slug(domain) && is_slug(object_id) => Ok(Self(value)),
            _ => Err(InvalidEntityId(value)),
        }
    }

    /// Build an identifier from a domain and a free-form name, slugifying the name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityId`] when the domain is invalid or the name
    /// slugifies to nothing.
    pub fn from_name(domain: &str, name: &str) -> Result<Self, InvalidEntityId> {
        Self::parse(format!("{domain}.{}", slugify(name)))
    }

    /// The part before the dot.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or("", |(domain, _)| domain)
    }

    /// The part after the dot.
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, object_id)| object_id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = InvalidEntityId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

fn is_slug(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('_')
        && !part.ends_with('_')
        && !part.contains("__")
        && part
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Turn a display name into an object id: lowercase ASCII alphanumerics
/// separated by single underscores.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_generate_unique_ids_when_called_twice() {
        assert_ne!(SubscriptionId::new(), SubscriptionId::new());
    }

    #[test]
    fn should_split_domain_and_object_id() {
        let id = EntityId::parse("binary_sensor.foo").unwrap();
        assert_eq!(id.domain(), "binary_sensor");
        assert_eq!(id.object_id(), "foo");
        assert_eq!(id.to_string(), "binary_sensor.foo");
    }

    #[test]
    fn should_reject_entity_id_without_dot() {
        assert!(EntityId::parse("sensor").is_err());
    }

    #[test]
    fn should_reject_entity_id_with_uppercase_or_double_underscore() {
        assert!(EntityId::parse("sensor.Foo").is_err());
        assert!(EntityId::parse("sensor.a__b").is_err());
        assert!(EntityId::parse("sensor._a").is_err());
        assert!(EntityId::parse("sensor.a.b").is_err());
    }

    #[test]
    fn should_slugify_display_name() {
        assert_eq!(slugify("Inverted foo"), "inverted_foo");
        assert_eq!(slugify("  Living Room -- Lamp! "), "living_room_lamp");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn should_build_entity_id_from_name() {
        let id = EntityId::from_name("binary_sensor", "Inverted bar").unwrap();
        assert_eq!(id.as_str(), "binary_sensor.inverted_bar");
        assert!(EntityId::from_name("binary_sensor", "***").is_err());
    }

    #[test]
    fn should_roundtrip_entity_id_through_serde_json() {
        let id = EntityId::parse("sensor.temperature").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sensor.temperature\"");
        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<EntityId>("\"nope\"").is_err());
    }
}
