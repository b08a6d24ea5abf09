//! Template entities: binary sensors and sensors whose state is computed
//! from templates over other entities' states.

use std::fmt;
use std::str::FromStr;

use crate::document::Document;
use crate::entity::{AttributeValue, Attributes, EntityState, SharedStates};
use crate::id::EntityId;
use crate::schema::{self, DocPath, MappingSchema, Schema, SchemaError, SchemaErrorKind};
use crate::template::{self, Dependencies, EvaluationError, Template, Value, Variables};

/// Entity platforms a template entry can define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    BinarySensor,
    Sensor,
}

impl Platform {
    pub const ALL: [Self; 2] = [Self::BinarySensor, Self::Sensor];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BinarySensor => "binary_sensor",
            Self::Sensor => "sensor",
        }
    }

    /// Configuration schema of one entity of this platform.
    #[must_use]
    pub fn schema(self) -> Schema {
        let schema = MappingSchema::new()
            .required("state", Schema::Template)
            .optional("name", Schema::String)
            .optional("unique_id", Schema::String)
            .optional("availability", Schema::Template)
            .optional("attributes", Schema::map(Schema::Template))
            .optional("device_class", Schema::String)
            .optional("variables", Schema::map(Schema::Any));
        match self {
            Self::BinarySensor => schema.into(),
            Self::Sensor => schema.optional("unit_of_measurement", Schema::String).into(),
        }
    }

    /// Map rendered state text onto an entity state.
    #[must_use]
    pub fn coerce_state(self, rendered: &str) -> EntityState {
        let trimmed = rendered.trim();
        match self {
            Self::BinarySensor => match trimmed.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => EntityState::On,
                "off" | "false" | "no" | "0" => EntityState::Off,
                _ => EntityState::Unknown,
            },
            Self::Sensor => match trimmed {
                "" | "None" | "none" => EntityState::Unknown,
                other => EntityState::parse(other),
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown template platform {0:?}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_sensor" => Ok(Self::BinarySensor),
            "sensor" => Ok(Self::Sensor),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// A configured variable: a fixed value or a template rendered on every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Static(Value),
    Template(Template),
}

/// Validated configuration of one template entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEntityConfig {
    pub platform: Platform,
    pub entity_id: EntityId,
    pub name: String,
    pub unique_id: Option<String>,
    pub state: Template,
    pub availability: Option<Template>,
    pub attributes: Vec<(String, Template)>,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub variables: Vec<(String, Variable)>,
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedState {
    pub state: EntityState,
    pub attributes: Attributes,
}

impl TemplateEntityConfig {
    /// Validate an entity configuration document and compile its templates.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] located under `path` when the document does
    /// not match [`Platform::schema`] or its name yields no valid entity id.
    pub fn from_document(platform: Platform, document: &Document, path: &DocPath) -> Result<Self, SchemaError> {
        let config = schema::validate_at(document, &platform.schema(), path)?;
        let text = |key: &str| config.get(key).and_then(Document::as_str).map(str::to_string);
        let compile = |source: &str, at: DocPath| {
            Template::compile(source).map_err(|err| SchemaError::new(at, SchemaErrorKind::Template(err)))
        };

        let name = text("name").unwrap_or_else(|| format!("Template {platform}"));
        let entity_id = EntityId::from_name(platform.as_str(), &name).map_err(|err| {
            SchemaError::new(path.key("name"), SchemaErrorKind::InvalidEntityId(err.0))
        })?;

        let state = compile(&text("state").unwrap_or_default(), path.key("state"))?;
        let availability = text("availability")
            .map(|source| compile(&source, path.key("availability")))
            .transpose()?;

        let mut attributes = Vec::new();
        if let Some(mapping) = config.get("attributes").and_then(Document::as_mapping) {
            for (key, value) in mapping.iter() {
                let source = value.as_str().unwrap_or_default();
                attributes.push((key.to_string(), compile(source, path.key("attributes").key(key))?));
            }
        }

        let mut variables = Vec::new();
        if let Some(mapping) = config.get("variables").and_then(Document::as_mapping) {
            for (key, value) in mapping.iter() {
                let variable = match value.as_str() {
                    Some(source) if template::is_template(source) => {
                        Variable::Template(compile(source, path.key("variables").key(key))?)
                    }
                    _ => Variable::Static(template::document_value(value)),
                };
                variables.push((key.to_string(), variable));
            }
        }

        Ok(Self {
            platform,
            entity_id,
            name,
            unique_id: text("unique_id"),
            state,
            availability,
            attributes,
            device_class: text("device_class"),
            unit_of_measurement: text("unit_of_measurement"),
            variables,
        })
    }

    /// Variables whose value is known without evaluation.
    #[must_use]
    pub fn static_variables(&self) -> Variables {
        self.variables
            .iter()
            .filter_map(|(key, variable)| match variable {
                Variable::Static(value) => Some((key.clone(), value.clone())),
                Variable::Template(_) => None,
            })
            .collect()
    }

    /// Every template owned by this entity.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        let variables = self.variables.iter().filter_map(|(_, variable)| match variable {
            Variable::Template(template) => Some(template),
            Variable::Static(_) => None,
        });
        variables
            .chain(self.availability.iter())
            .chain(std::iter::once(&self.state))
            .chain(self.attributes.iter().map(|(_, template)| template))
    }

    /// Union of the dependencies of every owned template, excluding the
    /// entity itself.
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        let statics = self.static_variables();
        let mut dependencies = Dependencies::default();
        for template in self.templates() {
            dependencies.merge(template.dependencies_with(&statics));
        }
        dependencies.entities.remove(&self.entity_id);
        dependencies.attributes.remove(&self.entity_id);
        dependencies
    }

    /// Attributes that do not depend on any template.
    #[must_use]
    pub fn static_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("friendly_name".to_string(), AttributeValue::from(self.name.as_str()));
        if let Some(device_class) = &self.device_class {
            attributes.insert("device_class".to_string(), AttributeValue::from(device_class.as_str()));
        }
        if let Some(unit) = &self.unit_of_measurement {
            attributes.insert("unit_of_measurement".to_string(), AttributeValue::from(unit.as_str()));
        }
        attributes
    }

    /// Compute the entity's state from the current states.
    ///
    /// Variables are bound first, in declaration order, with `this` set to
    /// the entity's own current state. A false availability short-circuits
    /// to `unavailable`.
    ///
    /// # Errors
    ///
    /// Returns the first [`EvaluationError`] raised by any template.
    pub fn evaluate(&self, states: &SharedStates) -> Result<ComputedState, EvaluationError> {
        let mut scope = Variables::new();
        let this = states
            .state(&self.entity_id)
            .map_or_else(|| Value::from(()), template::state_value);
        scope.insert("this".to_string(), this);

        for (key, variable) in &self.variables {
            let value = match variable {
                Variable::Static(value) => value.clone(),
                Variable::Template(template) => template::native_value(&template.render(states, &scope)?),
            };
            scope.insert(key.clone(), value);
        }

        let mut attributes = self.static_attributes();

        if let Some(availability) = &self.availability
            && !is_truthy_text(&availability.render(states, &scope)?)
        {
            return Ok(ComputedState {
                state: EntityState::Unavailable,
                attributes,
            });
        }

        let state = self.platform.coerce_state(&self.state.render(states, &scope)?);

        for (key, template) in &self.attributes {
            let rendered = template.render(states, &scope)?;
            attributes.insert(key.clone(), AttributeValue::parse_native(&rendered));
        }

        Ok(ComputedState { state, attributes })
    }
}

fn is_truthy_text(rendered: &str) -> bool {
    let trimmed = rendered.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "enable" | "1" => true,
        _ => trimmed.parse::<f64>().is_ok_and(|number| number != 0.0),
    }
}
