//! Input selectors: the optional type constraint carried by a blueprint input.

use crate::document::Document;
use crate::id::EntityId;
use crate::schema::{self, DocPath, MappingSchema, Schema, SchemaError, SchemaErrorKind};
use crate::template::{Template, TemplateSyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// An entity id, optionally restricted to some domains.
    Entity { domains: Vec<String> },
    Text,
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Select { options: Vec<String> },
    Template,
    /// A selector kind this crate does not check; any value is accepted.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid entity id {0:?}")]
    InvalidEntityId(String),
    #[error("entity {entity_id} is not in domains {allowed:?}")]
    Domain {
        entity_id: EntityId,
        allowed: Vec<String>,
    },
    #[error("value {value} is outside [{min:?}, {max:?}]")]
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    #[error("{value:?} is not one of {options:?}")]
    NotAnOption { value: String, options: Vec<String> },
    #[error("invalid template")]
    Template(#[source] TemplateSyntaxError),
}

impl Selector {
    /// Parse a selector node such as `{"entity": {"domain": "binary_sensor"}}`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] located at `path` when the node is not a
    /// single-key mapping or its configuration is malformed.
    pub fn parse(document: &Document, path: &DocPath) -> Result<Self, SchemaError> {
        let mapping = document.as_mapping().filter(|mapping| mapping.len() == 1).ok_or_else(|| {
            SchemaError::new(
                path.clone(),
                SchemaErrorKind::Invalid {
                    expected: "single-key selector mapping",
                    value: document.to_string(),
                },
            )
        })?;
        let Some((kind, config)) = mapping.iter().next() else {
            return Ok(Self::Other(String::new()));
        };
        let path = path.key(kind);

        Ok(match kind {
            "entity" => {
                let schema: Schema = MappingSchema::new()
                    .with_default("domain", Schema::list(Schema::String), Document::Sequence(Vec::new()))
                    .allow_extra()
                    .into();
                let config = schema::validate_at(&or_empty(config), &schema, &path)?;
                Self::Entity {
                    domains: strings(config.get("domain")),
                }
            }
            "text" => Self::Text,
            "number" => {
                let schema: Schema = MappingSchema::new()
                    .optional("min", Schema::Number)
                    .optional("max", Schema::Number)
                    .allow_extra()
                    .into();
                let config = schema::validate_at(&or_empty(config), &schema, &path)?;
                Self::Number {
                    min: config.get("min").and_then(Document::as_f64),
                    max: config.get("max").and_then(Document::as_f64),
                }
            }
            "boolean" => Self::Boolean,
            "select" => {
                let schema: Schema = MappingSchema::new()
                    .required("options", Schema::list(Schema::String))
                    .allow_extra()
                    .into();
                let config = schema::validate_at(&or_empty(config), &schema, &path)?;
                Self::Select {
                    options: strings(config.get("options")),
                }
            }
            "template" => Self::Template,
            other => Self::Other(other.to_string()),
        })
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Entity { .. } => "entity",
            Self::Text => "text",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Select { .. } => "select",
            Self::Template => "template",
            Self::Other(kind) => kind,
        }
    }

    /// Check a supplied input value against this selector.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] describing the first mismatch.
    pub fn check(&self, value: &Document) -> Result<(), SelectorError> {
        match self {
            Self::Entity { domains } => match value {
                Document::Sequence(items) => items.iter().try_for_each(|item| check_entity(item, domains)),
                single => check_entity(single, domains),
            },
            Self::Text => match value {
                Document::String(_) | Document::Number(_) | Document::Bool(_) => Ok(()),
                other => Err(wrong_type("text", other)),
            },
            Self::Number { min, max } => {
                let number = match value {
                    Document::Number(number) => number.as_f64(),
                    Document::String(raw) => raw.trim().parse().ok(),
                    _ => None,
                }
                .ok_or_else(|| wrong_type("number", value))?;
                let below = min.is_some_and(|min| number < min);
                let above = max.is_some_and(|max| number > max);
                if below || above {
                    return Err(SelectorError::OutOfRange {
                        value: number,
                        min: *min,
                        max: *max,
                    });
                }
                Ok(())
            }
            Self::Boolean => match value {
                Document::Bool(_) => Ok(()),
                other => Err(wrong_type("boolean", other)),
            },
            Self::Select { options } => {
                let raw = value.as_str().ok_or_else(|| wrong_type("string", value))?;
                if options.iter().any(|option| option == raw) {
                    Ok(())
                } else {
                    Err(SelectorError::NotAnOption {
                        value: raw.to_string(),
                        options: options.clone(),
                    })
                }
            }
            Self::Template => {
                let source = value.as_str().ok_or_else(|| wrong_type("template", value))?;
                Template::compile(source)
                    .map(|_| ())
                    .map_err(SelectorError::Template)
            }
            Self::Other(_) => Ok(()),
        }
    }
}

fn check_entity(value: &Document, domains: &[String]) -> Result<(), SelectorError> {
    let raw = value.as_str().ok_or_else(|| wrong_type("entity id", value))?;
    let entity_id = EntityId::parse(raw).map_err(|_| SelectorError::InvalidEntityId(raw.to_string()))?;
    if domains.is_empty() || domains.iter().any(|domain| domain == entity_id.domain()) {
        Ok(())
    } else {
        Err(SelectorError::Domain {
            entity_id,
            allowed: domains.to_vec(),
        })
    }
}

fn wrong_type(expected: &'static str, value: &Document) -> SelectorError {
    SelectorError::WrongType {
        expected,
        found: value.kind(),
    }
}

fn or_empty(config: &Document) -> Document {
    match config {
        Document::Null => Document::Mapping(crate::document::Mapping::new()),
        other => other.clone(),
    }
}

fn strings(document: Option<&Document>) -> Vec<String> {
    document
        .and_then(Document::as_sequence)
        .unwrap_or_default()
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}
