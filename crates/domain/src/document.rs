//! Structured documents: the closed value tree every configuration is
//! decoded into before validation.
//!
//! A document is what a YAML/JSON/TOML decoder produces, plus one extra case:
//! [`Document::Placeholder`], the whole-value substitution point of a
//! blueprint. Decoders encode a placeholder as a single-key mapping
//! `{"!input": "<name>"}`; [`From<serde_json::Value>`] recognises that shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mapping key that marks a placeholder node.
pub const INPUT_TAG: &str = "!input";

/// A structured document node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Document {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Sequence(Vec<Document>),
    Mapping(Mapping),
    /// Substitute the bound value of the named blueprint input here.
    Placeholder(String),
}

impl Document {
    /// Short name of the node kind, used in validation messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::Placeholder(_) => "input placeholder",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => value.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Document]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up `key` when this node is a mapping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_mapping().and_then(|mapping| mapping.get(key))
    }

    /// Names of every placeholder in this subtree, in document order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_placeholders(&mut names);
        names
    }

    fn collect_placeholders<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Placeholder(name) => names.push(name),
            Self::Sequence(items) => items.iter().for_each(|item| item.collect_placeholders(names)),
            Self::Mapping(mapping) => mapping
                .values()
                .for_each(|value| value.collect_placeholders(names)),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Whether any placeholder remains in this subtree.
    #[must_use]
    pub fn has_placeholders(&self) -> bool {
        match self {
            Self::Placeholder(_) => true,
            Self::Sequence(items) => items.iter().any(Self::has_placeholders),
            Self::Mapping(mapping) => mapping.values().any(Self::has_placeholders),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => false,
        }
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::String(value),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(object) => {
                if object.len() == 1
                    && let Some(Value::String(name)) = object.get(INPUT_TAG)
                {
                    return Self::Placeholder(name.clone());
                }
                Self::Mapping(
                    object
                        .into_iter()
                        .map(|(key, value)| (key, Self::from(value)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Document> for serde_json::Value {
    fn from(document: Document) -> Self {
        use serde_json::Value;

        match document {
            Document::Null => Value::Null,
            Document::Bool(value) => Value::Bool(value),
            Document::Number(value) => Value::Number(value),
            Document::String(value) => Value::String(value),
            Document::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Document::Mapping(mapping) => Value::Object(
                mapping
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
            Document::Placeholder(name) => {
                let mut object = serde_json::Map::new();
                object.insert(INPUT_TAG.to_string(), Value::String(name));
                Value::Object(object)
            }
        }
    }
}

impl From<&str> for Document {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Document {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Document {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Document {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Mapping> for Document {
    fn from(mapping: Mapping) -> Self {
        Self::Mapping(mapping)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::Value::from(self.clone());
        write!(f, "{value}")
    }
}

/// Insertion-ordered string-keyed mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, Document)>,
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.entries
            .iter()
            .find_map(|(k, value)| (k == key).then_some(value))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace `key`. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Document) -> Option<Document> {
        let key = key.into();
        if let Some((_, slot)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Document> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|(_, value)| value)
    }
}

impl FromIterator<(String, Document)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (String, Document)>>(iter: T) -> Self {
        let mut mapping = Self::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, Document);
    type IntoIter = std::vec::IntoIter<(String, Document)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
