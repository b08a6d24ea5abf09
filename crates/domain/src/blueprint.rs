//! Blueprint: a reusable, parameterised configuration with named inputs.
//!
//! A blueprint document has a `domain`, an `input` mapping and optional
//! metadata (`name`, `description`, `author`, `source_url`). Every other
//! top-level key is the body, where `{"!input": "<name>"}` placeholders mark
//! the substitution points.
//!
//! ```json
//! {
//!   "domain": "template",
//!   "input": { "original_entity": { "selector": { "entity": {} } } },
//!   "binary_sensor": { "state": "{{ ... }}", "variables": { "source": { "!input": "original_entity" } } }
//! }
//! ```

mod input;
mod instantiate;
mod selector;

pub use input::Input;
pub use instantiate::InputError;
pub use selector::{Selector, SelectorError};

use crate::document::{Document, Mapping};
use crate::schema::{self, DocPath, MappingSchema, Schema, SchemaError};

/// Why a blueprint document was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidBlueprint {
    #[error("blueprint schema violation")]
    Schema(#[from] SchemaError),
    #[error("blueprint is for domain {found:?}, expected {expected:?}")]
    WrongDomain { expected: String, found: String },
    #[error("placeholder references undeclared input {0:?}")]
    UndeclaredInput(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlueprintError {
    #[error("blueprint {path} not found")]
    NotFound { path: String },
    #[error("invalid blueprint {path}")]
    Invalid {
        path: String,
        #[source]
        source: InvalidBlueprint,
    },
}

/// Descriptive fields shown to users; never substituted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlueprintMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub source_url: Option<String>,
}

/// A validated blueprint. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    domain: String,
    path: String,
    metadata: BlueprintMetadata,
    inputs: Vec<Input>,
    body: Mapping,
}

/// Schema every blueprint document must satisfy.
#[must_use]
pub fn definition_schema() -> Schema {
    MappingSchema::new()
        .required("domain", Schema::String)
        .with_default("input", Schema::map(Schema::Raw), Mapping::new())
        .optional("name", Schema::String)
        .optional("description", Schema::String)
        .optional("author", Schema::String)
        .optional("source_url", Schema::String)
        .allow_extra()
        .into()
}

impl Blueprint {
    /// Validate a decoded document and build a blueprint from it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBlueprint`] when the document does not match the
    /// definition schema, targets another domain, or its body references an
    /// input that is not declared.
    pub fn from_document(
        expected_domain: &str,
        path: impl Into<String>,
        document: &Document,
    ) -> Result<Self, InvalidBlueprint> {
        let validated = schema::validate(document, &definition_schema())?;
        let Document::Mapping(mut mapping) = validated else {
            return Err(InvalidBlueprint::Schema(SchemaError::new(
                DocPath::root(),
                schema::SchemaErrorKind::WrongType {
                    expected: "mapping",
                    found: document.kind(),
                },
            )));
        };

        let domain = take_string(&mut mapping, "domain").unwrap_or_default();
        if domain != expected_domain {
            return Err(InvalidBlueprint::WrongDomain {
                expected: expected_domain.to_string(),
                found: domain,
            });
        }

        let declared = match mapping.remove("input") {
            Some(Document::Mapping(inputs)) => inputs,
            _ => Mapping::new(),
        };
        let inputs = input::parse_inputs(&declared, &DocPath::root().key("input"))?;

        let metadata = BlueprintMetadata {
            name: take_string(&mut mapping, "name"),
            description: take_string(&mut mapping, "description"),
            author: take_string(&mut mapping, "author"),
            source_url: take_string(&mut mapping, "source_url"),
        };
        let blueprint = Self {
            domain,
            path: path.into(),
            metadata,
            inputs,
            body: mapping,
        };
        if let Some(undeclared) = blueprint.undeclared_placeholder() {
            return Err(InvalidBlueprint::UndeclaredInput(undeclared.to_string()));
        }
        Ok(blueprint)
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn metadata(&self) -> &BlueprintMetadata {
        &self.metadata
    }

    /// Declared inputs, sections flattened, in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Input> {
        self.inputs.iter().find(|input| input.key == key)
    }

    #[must_use]
    pub fn body(&self) -> &Mapping {
        &self.body
    }

    fn undeclared_placeholder(&self) -> Option<&str> {
        self.body
            .values()
            .flat_map(Document::placeholders)
            .find(|name| self.input(name).is_none())
    }
}

fn take_string(mapping: &mut Mapping, key: &str) -> Option<String> {
    match mapping.remove(key) {
        Some(Document::String(value)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn inverted() -> Document {
        Document::from(json!({
            "name": "Invert a binary sensor",
            "author": "tmplhub",
            "domain": "template",
            "input": {
                "original_entity": {
                    "name": "Binary sensor to invert",
                    "selector": {"entity": {"domain": "binary_sensor"}}
                }
            },
            "variables": {"original_entity": {"!input": "original_entity"}},
            "binary_sensor": {
                "state": "{{ not is_state(original_entity, 'on') }}"
            }
        }))
    }

    #[test]
    fn should_split_metadata_inputs_and_body() {
        let blueprint = Blueprint::from_document("template", "inverted.toml", &inverted()).unwrap();

        assert_eq!(blueprint.domain(), "template");
        assert_eq!(blueprint.path(), "inverted.toml");
        assert_eq!(blueprint.metadata().name.as_deref(), Some("Invert a binary sensor"));
        assert_eq!(blueprint.metadata().author.as_deref(), Some("tmplhub"));
        assert_eq!(blueprint.inputs().len(), 1);
        let keys: Vec<_> = blueprint.body().keys().collect();
        assert_eq!(keys, ["variables", "binary_sensor"]);
    }

    #[test]
    fn should_fail_when_domain_does_not_match() {
        let err = Blueprint::from_document("automation", "x", &inverted()).unwrap_err();
        assert_eq!(
            err,
            InvalidBlueprint::WrongDomain {
                expected: "automation".to_string(),
                found: "template".to_string(),
            }
        );
    }

    #[test]
    fn should_fail_when_placeholder_is_not_declared() {
        let document = Document::from(json!({
            "domain": "template",
            "input": {"a": null},
            "sensor": {"state": {"!input": "b"}}
        }));
        let err = Blueprint::from_document("template", "x", &document).unwrap_err();
        assert_eq!(err, InvalidBlueprint::UndeclaredInput("b".to_string()));
    }

    #[test]
    fn should_fail_with_path_when_domain_is_missing() {
        let document = Document::from(json!({"input": {}}));
        let err = Blueprint::from_document("template", "x", &document).unwrap_err();
        let InvalidBlueprint::Schema(err) = err else {
            panic!("expected a schema error, got {err:?}");
        };
        assert_eq!(err.path.to_string(), "domain");
    }

    #[test]
    fn should_accept_blueprint_without_inputs() {
        let document = Document::from(json!({"domain": "template", "sensor": {"state": "1"}}));
        let blueprint = Blueprint::from_document("template", "x", &document).unwrap();
        assert!(blueprint.inputs().is_empty());
    }
}
