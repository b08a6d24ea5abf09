//! Entity state: the current value of an entity.

use serde::{Deserialize, Serialize};

/// Discrete state of an entity.
///
/// Binary entities use [`On`](Self::On) / [`Off`](Self::Off); anything else
/// (a sensor reading, a mode name) is kept verbatim in [`Other`](Self::Other).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityState {
    On,
    Off,
    #[default]
    Unknown,
    Unavailable,
    Other(String),
}

impl EntityState {
    /// Parse a raw state string; the four reserved words are matched exactly.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "on" => Self::On,
            "off" => Self::Off,
            "unknown" => Self::Unknown,
            "unavailable" => Self::Unavailable,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the entity is reachable (anything but [`Unavailable`](Self::Unavailable)).
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    /// Whether the state carries a real value (neither unknown nor unavailable).
    #[must_use]
    pub fn has_value(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Unavailable)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
            Self::Other(value) => value,
        }
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntityState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for EntityState {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<EntityState> for String {
    fn from(state: EntityState) -> Self {
        match state {
            EntityState::Other(value) => value,
            reserved => reserved.as_str().to_string(),
        }
    }
}
