//! Declared blueprint inputs.

use super::selector::Selector;
use crate::document::{Document, Mapping};
use crate::schema::{self, DocPath, MappingSchema, Schema, SchemaError, SchemaErrorKind};

/// A named blueprint parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub key: String,
    /// Human-friendly label.
    pub name: Option<String>,
    pub description: Option<String>,
    pub default: Option<Document>,
    pub selector: Option<Selector>,
    /// Section the input was declared in, if any.
    pub section: Option<String>,
}

impl Input {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            description: None,
            default: None,
            selector: None,
            section: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Document>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

fn input_schema() -> Schema {
    MappingSchema::new()
        .optional("name", Schema::String)
        .optional("description", Schema::String)
        .optional("default", Schema::Any)
        .optional("selector", Schema::Any)
        .into()
}

fn section_schema() -> Schema {
    MappingSchema::new()
        .optional("name", Schema::String)
        .optional("description", Schema::String)
        .optional("icon", Schema::String)
        .optional("collapsed", Schema::Boolean)
        .required("input", Schema::map(Schema::Raw))
        .into()
}

/// Flatten the `input` mapping of a blueprint, sections included.
///
/// `path` points at the `input` mapping itself.
pub(crate) fn parse_inputs(inputs: &Mapping, path: &DocPath) -> Result<Vec<Input>, SchemaError> {
    let mut parsed: Vec<Input> = Vec::new();

    for (key, value) in inputs.iter() {
        let at = path.key(key);
        if value.get("input").is_some() {
            let section = schema::validate_at(value, &section_schema(), &at)?;
            let nested = section
                .get("input")
                .and_then(Document::as_mapping)
                .cloned()
                .unwrap_or_default();
            for (nested_key, nested_value) in nested.iter() {
                let nested_at = at.key("input").key(nested_key);
                if nested_value.get("input").is_some() {
                    return Err(SchemaError::new(
                        nested_at.key("input"),
                        SchemaErrorKind::Invalid {
                            expected: "input (sections cannot nest)",
                            value: nested_value.to_string(),
                        },
                    ));
                }
                let mut input = parse_input(nested_key, nested_value, &nested_at)?;
                input.section = Some(key.to_string());
                push_unique(&mut parsed, input, &nested_at)?;
            }
        } else {
            let input = parse_input(key, value, &at)?;
            push_unique(&mut parsed, input, &at)?;
        }
    }

    Ok(parsed)
}

fn push_unique(parsed: &mut Vec<Input>, input: Input, path: &DocPath) -> Result<(), SchemaError> {
    if parsed.iter().any(|existing| existing.key == input.key) {
        return Err(SchemaError::new(
            path.clone(),
            SchemaErrorKind::Invalid {
                expected: "unique input name",
                value: input.key,
            },
        ));
    }
    parsed.push(input);
    Ok(())
}

fn parse_input(key: &str, value: &Document, path: &DocPath) -> Result<Input, SchemaError> {
    if matches!(value, Document::Null) {
        return Ok(Input::new(key));
    }
    let config = schema::validate_at(value, &input_schema(), path)?;
    let text = |field: &str| config.get(field).and_then(Document::as_str).map(str::to_string);
    let selector = match config.get("selector") {
        Some(selector) => Some(Selector::parse(selector, &path.key("selector"))?),
        None => None,
    };

    Ok(Input {
        key: key.to_string(),
        name: text("name"),
        description: text("description"),
        default: config.get("default").cloned(),
        selector,
        section: None,
    })
}
