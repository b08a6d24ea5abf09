//! Declarative document validation.
//!
//! A [`Schema`] describes the expected shape of a [`Document`]. Validation
//! returns a new, coerced document (numbers given as strings become numbers,
//! `"on"` becomes `true`, a single item becomes a one-element list) or the
//! first [`SchemaError`] found, with the exact path of the offending node.

use std::fmt;

use crate::document::{Document, Mapping};
use crate::id::EntityId;
use crate::template::{Template, TemplateSyntaxError};

/// One step into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a document, e.g. `template[1].use_blueprint.path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocPath(Vec<PathSegment>);

impl DocPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// `prefix` followed by this path.
    #[must_use]
    pub fn under(&self, prefix: &Self) -> Self {
        Self(prefix.0.iter().chain(&self.0).cloned().collect())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if position == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaErrorKind {
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid {expected}: {value:?}")]
    Invalid { expected: &'static str, value: String },
    #[error("invalid entity id {0:?}")]
    InvalidEntityId(String),
    #[error("value {value:?} is not one of {options:?}")]
    NotAllowed { value: String, options: Vec<String> },
    #[error("invalid template")]
    Template(#[source] TemplateSyntaxError),
    #[error("required key not provided")]
    Required,
    #[error("extra keys not allowed")]
    ExtraKey,
    #[error("keys {0:?} are mutually exclusive")]
    Exclusive(Vec<String>),
    #[error("at least one of {0:?} is required")]
    AtLeastOne(Vec<String>),
    #[error("unexpected input placeholder {0:?}")]
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at {path}")]
pub struct SchemaError {
    pub path: DocPath,
    #[source]
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    #[must_use]
    pub fn new(path: DocPath, kind: SchemaErrorKind) -> Self {
        Self { path, kind }
    }

    /// Re-anchor an error found in a sub-document.
    #[must_use]
    pub fn under(self, prefix: &DocPath) -> Self {
        Self {
            path: self.path.under(prefix),
            kind: self.kind,
        }
    }
}

/// How a mapping treats keys it does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extra {
    #[default]
    Forbid,
    /// Keep undeclared keys as they are.
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    Default(Document),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub schema: Schema,
    pub presence: Presence,
}

/// Cross-field rule checked after every field validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// At most one of these keys may be present.
    Exclusive(Vec<String>),
    AtLeastOne(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingSchema {
    fields: Vec<Field>,
    extra: Extra,
    constraints: Vec<Constraint>,
}

impl MappingSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(self, key: impl Into<String>, schema: Schema) -> Self {
        self.field(key, schema, Presence::Required)
    }

    #[must_use]
    pub fn optional(self, key: impl Into<String>, schema: Schema) -> Self {
        self.field(key, schema, Presence::Optional)
    }

    #[must_use]
    pub fn with_default(self, key: impl Into<String>, schema: Schema, default: impl Into<Document>) -> Self {
        self.field(key, schema, Presence::Default(default.into()))
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, schema: Schema, presence: Presence) -> Self {
        self.fields.push(Field {
            key: key.into(),
            schema,
            presence,
        });
        self
    }

    #[must_use]
    pub fn allow_extra(mut self) -> Self {
        self.extra = Extra::Allow;
        self
    }

    #[must_use]
    pub fn exclusive<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints
            .push(Constraint::Exclusive(keys.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn at_least_one<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints
            .push(Constraint::AtLeastOne(keys.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn find(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.key == key)
    }
}

/// Expected shape of a document node.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Anything, placeholders included.
    Raw,
    /// Any plain data; placeholders are rejected.
    Any,
    String,
    Boolean,
    Integer,
    Number,
    EntityId,
    /// A string that must compile as a template.
    Template,
    Enum(Vec<String>),
    /// A list of items; a single item is accepted as a one-element list.
    List(Box<Schema>),
    /// Free keys with values of one schema.
    Map(Box<Schema>),
    Mapping(MappingSchema),
}

impl Schema {
    #[must_use]
    pub fn one_of<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(options.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn list(item: Self) -> Self {
        Self::List(Box::new(item))
    }

    #[must_use]
    pub fn map(value: Self) -> Self {
        Self::Map(Box::new(value))
    }
}

impl From<MappingSchema> for Schema {
    fn from(schema: MappingSchema) -> Self {
        Self::Mapping(schema)
    }
}

/// Validate `document` against `schema`, returning the coerced document.
///
/// # Errors
///
/// Returns the first [`SchemaError`] encountered.
pub fn validate(document: &Document, schema: &Schema) -> Result<Document, SchemaError> {
    validate_at(document, schema, &DocPath::root())
}

/// Like [`validate`], reporting paths relative to `path`.
///
/// # Errors
///
/// Returns the first [`SchemaError`] encountered.
pub fn validate_at(document: &Document, schema: &Schema, path: &DocPath) -> Result<Document, SchemaError> {
    let fail = |kind| Err(SchemaError::new(path.clone(), kind));

    if let Document::Placeholder(name) = document {
        return match schema {
            Schema::Raw => Ok(document.clone()),
            _ => fail(SchemaErrorKind::Placeholder(name.clone())),
        };
    }

    match schema {
        Schema::Raw => Ok(document.clone()),
        Schema::Any => match first_placeholder(document, path) {
            Some((at, name)) => Err(SchemaError::new(at, SchemaErrorKind::Placeholder(name))),
            None => Ok(document.clone()),
        },
        Schema::String => coerce_string(document)
            .map(Document::String)
            .ok_or_else(|| wrong_type(path, "string", document)),
        Schema::Boolean => coerce_bool(document, path).map(Document::Bool),
        Schema::Integer => coerce_integer(document, path).map(Document::from),
        Schema::Number => coerce_number(document, path).map(Document::Number),
        Schema::EntityId => {
            let raw = document
                .as_str()
                .ok_or_else(|| wrong_type(path, "entity id", document))?;
            EntityId::parse(raw.trim().to_ascii_lowercase())
                .map(|entity_id| Document::String(entity_id.into()))
                .map_err(|_| SchemaError::new(path.clone(), SchemaErrorKind::InvalidEntityId(raw.to_string())))
        }
        Schema::Template => {
            let source = coerce_string(document).ok_or_else(|| wrong_type(path, "template", document))?;
            Template::compile(source.as_str())
                .map_err(|err| SchemaError::new(path.clone(), SchemaErrorKind::Template(err)))?;
            Ok(Document::String(source))
        }
        Schema::Enum(options) => {
            let value = coerce_string(document).ok_or_else(|| wrong_type(path, "string", document))?;
            if options.contains(&value) {
                Ok(Document::String(value))
            } else {
                fail(SchemaErrorKind::NotAllowed {
                    value,
                    options: options.clone(),
                })
            }
        }
        Schema::List(item) => match document {
            Document::Null => Ok(Document::Sequence(Vec::new())),
            Document::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| validate_at(value, item, &path.index(index)))
                .collect::<Result<_, _>>()
                .map(Document::Sequence),
            single => Ok(Document::Sequence(vec![validate_at(single, item, &path.index(0))?])),
        },
        Schema::Map(value_schema) => {
            let mapping = document
                .as_mapping()
                .ok_or_else(|| wrong_type(path, "mapping", document))?;
            mapping
                .iter()
                .map(|(key, value)| {
                    validate_at(value, value_schema, &path.key(key)).map(|value| (key.to_string(), value))
                })
                .collect::<Result<Mapping, _>>()
                .map(Document::Mapping)
        }
        Schema::Mapping(schema) => {
            let mapping = document
                .as_mapping()
                .ok_or_else(|| wrong_type(path, "mapping", document))?;
            validate_mapping(mapping, schema, path).map(Document::Mapping)
        }
    }
}

fn validate_mapping(mapping: &Mapping, schema: &MappingSchema, path: &DocPath) -> Result<Mapping, SchemaError> {
    let mut out = Mapping::new();

    for (key, value) in mapping.iter() {
        match schema.find(key) {
            Some(field) => {
                out.insert(key, validate_at(value, &field.schema, &path.key(key))?);
            }
            None if schema.extra == Extra::Allow => {
                out.insert(key, value.clone());
            }
            None => return Err(SchemaError::new(path.key(key), SchemaErrorKind::ExtraKey)),
        }
    }

    for field in &schema.fields {
        if mapping.contains_key(&field.key) {
            continue;
        }
        match &field.presence {
            Presence::Required => {
                return Err(SchemaError::new(path.key(&field.key), SchemaErrorKind::Required));
            }
            Presence::Default(default) => {
                out.insert(&field.key, default.clone());
            }
            Presence::Optional => {}
        }
    }

    for constraint in &schema.constraints {
        match constraint {
            Constraint::Exclusive(keys) => {
                let present = keys.iter().filter(|key| mapping.contains_key(key)).count();
                if present > 1 {
                    return Err(SchemaError::new(path.clone(), SchemaErrorKind::Exclusive(keys.clone())));
                }
            }
            Constraint::AtLeastOne(keys) => {
                if !keys.iter().any(|key| mapping.contains_key(key)) {
                    return Err(SchemaError::new(path.clone(), SchemaErrorKind::AtLeastOne(keys.clone())));
                }
            }
        }
    }

    Ok(out)
}

fn wrong_type(path: &DocPath, expected: &'static str, document: &Document) -> SchemaError {
    SchemaError::new(
        path.clone(),
        SchemaErrorKind::WrongType {
            expected,
            found: document.kind(),
        },
    )
}

fn invalid(path: &DocPath, expected: &'static str, document: &Document) -> SchemaError {
    SchemaError::new(
        path.clone(),
        SchemaErrorKind::Invalid {
            expected,
            value: document.to_string(),
        },
    )
}

fn first_placeholder(document: &Document, path: &DocPath) -> Option<(DocPath, String)> {
    match document {
        Document::Placeholder(name) => Some((path.clone(), name.clone())),
        Document::Sequence(items) => items
            .iter()
            .enumerate()
            .find_map(|(index, item)| first_placeholder(item, &path.index(index))),
        Document::Mapping(mapping) => mapping
            .iter()
            .find_map(|(key, value)| first_placeholder(value, &path.key(key))),
        Document::Null | Document::Bool(_) | Document::Number(_) | Document::String(_) => None,
    }
}

fn coerce_string(document: &Document) -> Option<String> {
    match document {
        Document::String(value) => Some(value.clone()),
        Document::Number(number) => Some(number.to_string()),
        Document::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn coerce_bool(document: &Document, path: &DocPath) -> Result<bool, SchemaError> {
    match document {
        Document::Bool(value) => Ok(*value),
        Document::Number(number) => Ok(number.as_f64().is_some_and(|value| value != 0.0)),
        Document::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "enable" | "1" => Ok(true),
            "false" | "off" | "no" | "disable" | "0" => Ok(false),
            _ => Err(invalid(path, "boolean", document)),
        },
        _ => Err(wrong_type(path, "boolean", document)),
    }
}

fn coerce_integer(document: &Document, path: &DocPath) -> Result<i64, SchemaError> {
    match document {
        Document::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0 && value.abs() < 9.0e15)
                    .map(|value| {
                        #[allow(clippy::cast_possible_truncation)]
                        let int = value as i64;
                        int
                    })
            })
            .ok_or_else(|| invalid(path, "integer", document)),
        Document::String(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(path, "integer", document)),
        _ => Err(wrong_type(path, "integer", document)),
    }
}

fn coerce_number(document: &Document, path: &DocPath) -> Result<serde_json::Number, SchemaError> {
    match document {
        Document::Number(number) => Ok(number.clone()),
        Document::String(raw) => {
            let raw = raw.trim();
            if let Ok(int) = raw.parse::<i64>() {
                return Ok(int.into());
            }
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .ok_or_else(|| invalid(path, "number", document))
        }
        _ => Err(wrong_type(path, "number", document)),
    }
}
