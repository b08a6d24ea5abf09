//! Template language used by template entities.
//!
//! Templates are Jinja, rendered with minijinja: `{{ expr }}` output,
//! `{% if %}` blocks, `{# #}` comments and `-` whitespace control. Entity
//! states are read through [`StateLookup`](crate::entity::StateLookup) and
//! never mutated. Booleans and none render the Python way (`True`, `None`).
//!
//! Templates are compiled once, when their configuration is validated.
//! Unknown functions, unknown filters and wrong argument counts are compile
//! errors; everything else fails at evaluation time.

mod deps;
mod env;
mod objects;
mod syntax;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use minijinja::{Environment, ErrorKind};

pub use deps::Dependencies;
pub use minijinja::Value;
pub use objects::state_value;

use self::objects::StatesObject;
use crate::document::Document;
use crate::entity::{AttributeValue, SharedStates};

/// Names bound while rendering a template.
pub type Variables = BTreeMap<String, Value>;

/// Why a template failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxReason {
    #[error("{0}")]
    Invalid(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("unknown filter {0:?}")]
    UnknownFilter(String),
    #[error("{name} takes {min} to {max} arguments, got {got}")]
    Arity {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template syntax error{}: {reason}", .line.map(|line| format!(" on line {line}")).unwrap_or_default())]
pub struct TemplateSyntaxError {
    /// Line of the template source, when known.
    pub line: Option<usize>,
    #[source]
    pub reason: SyntaxReason,
}

impl TemplateSyntaxError {
    fn from_reason(reason: SyntaxReason) -> Self {
        Self { line: None, reason }
    }
}

impl From<minijinja::Error> for TemplateSyntaxError {
    fn from(err: minijinja::Error) -> Self {
        let message = err.detail().map_or_else(|| err.kind().to_string(), str::to_string);
        Self {
            line: err.line(),
            reason: SyntaxReason::Invalid(message),
        }
    }
}

/// Failure while rendering a compiled template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("undefined value: {0}")]
    Undefined(String),
    #[error("cannot convert {value:?} to {target}")]
    Conversion { value: String, target: &'static str },
    #[error("result is not a finite number")]
    NonFinite,
    #[error("{0}")]
    Render(String),
}

impl From<minijinja::Error> for EvaluationError {
    fn from(err: minijinja::Error) -> Self {
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(raised) = inner.downcast_ref::<Self>() {
                return raised.clone();
            }
            source = inner.source();
        }
        let message = err.detail().map_or_else(|| err.kind().to_string(), str::to_string);
        match err.kind() {
            ErrorKind::UndefinedError => Self::Undefined(message),
            _ => Self::Render(message),
        }
    }
}

/// A compiled template.
#[derive(Clone)]
pub struct Template {
    source: String,
    is_static: bool,
    env: Arc<Environment<'static>>,
}

impl Template {
    /// Compile template source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateSyntaxError`] when the source does not parse, names
    /// an unknown function or filter, or passes the wrong number of
    /// arguments.
    pub fn compile(source: impl Into<String>) -> Result<Self, TemplateSyntaxError> {
        let source = source.into();
        let is_static = {
            let root = syntax::parse(&source)?;
            syntax::check(&root).map_err(TemplateSyntaxError::from_reason)?;
            match &root {
                syntax::Stmt::Template(node) => node
                    .children
                    .iter()
                    .all(|child| matches!(child, syntax::Stmt::EmitRaw(_))),
                _ => false,
            }
        };
        let env = env::build(source.clone())?;
        Ok(Self {
            source,
            is_static,
            env: Arc::new(env),
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template is plain text with nothing to evaluate.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Render against the current states and the given variables.
    ///
    /// Variables shadow `states`.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] on undefined variables, type mismatches,
    /// non-finite arithmetic results or failed conversions.
    pub fn render(&self, states: &SharedStates, variables: &Variables) -> Result<String, EvaluationError> {
        let root = Value::from_object(StatesObject::new(states.clone()));
        let mut context: BTreeMap<&str, Value> = BTreeMap::new();
        context.insert(env::STATES, root.clone());
        for (key, value) in variables {
            context.insert(key, value.clone());
        }
        context.insert(env::STATES_HANDLE, root);

        let template = self.env.get_template(env::TEMPLATE_NAME)?;
        Ok(template.render(&context)?)
    }

    /// Entities this template statically reads.
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        deps::resolve(self)
    }

    /// Like [`Template::dependencies`], resolving names bound to static
    /// string variables as entity ids.
    #[must_use]
    pub fn dependencies_with(&self, statics: &Variables) -> Dependencies {
        deps::resolve_with(self, statics)
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.source).finish()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether a string contains template markup.
#[must_use]
pub fn is_template(source: &str) -> bool {
    source.contains("{{") || source.contains("{%") || source.contains("{#")
}

/// Template value of a configuration document.
///
/// Placeholders never reach this point once a config is validated.
#[must_use]
pub fn document_value(document: &Document) -> Value {
    Value::from_serialize(document)
}

/// Template value of rendered output: numbers and booleans become native,
/// `None` becomes none, anything else stays a string.
#[must_use]
pub fn native_value(rendered: &str) -> Value {
    match AttributeValue::parse_native(rendered) {
        AttributeValue::String(text) if text == "None" => Value::from(()),
        other => Value::from_serialize(&other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::entity::{Attributes, EntityState, StateSnapshot};
    use crate::id::EntityId;
    use crate::time::now;

    fn states(entries: &[(&str, &str)]) -> SharedStates {
        let states: HashMap<EntityId, StateSnapshot> = entries
            .iter()
            .map(|(id, state)| {
                let entity_id = EntityId::parse(*id).unwrap();
                let snapshot = StateSnapshot::new(
                    entity_id.clone(),
                    EntityState::parse(state),
                    Attributes::new(),
                    now(),
                );
                (entity_id, snapshot)
            })
            .collect();
        Arc::new(states)
    }

    fn render(source: &str, lookup: &SharedStates) -> Result<String, EvaluationError> {
        Template::compile(source).unwrap().render(lookup, &Variables::new())
    }

    fn empty() -> SharedStates {
        states(&[])
    }

    #[test]
    fn should_render_plain_text_unchanged() {
        let template = Template::compile("hello").unwrap();
        assert!(template.is_static());
        assert!(!Template::compile("{{ 1 }}").unwrap().is_static());
        assert_eq!(render("hello", &empty()).unwrap(), "hello");
    }

    #[test]
    fn should_read_entity_state_through_states_function() {
        let lookup = states(&[("sensor.foo", "on")]);
        assert_eq!(render("{{ states('sensor.foo') }}", &lookup).unwrap(), "on");
    }

    #[test]
    fn should_render_unknown_when_entity_is_missing() {
        assert_eq!(
            render("{{ states('sensor.missing') }}", &empty()).unwrap(),
            "unknown"
        );
        assert_eq!(
            render("{{ states('not an id') }}", &empty()).unwrap(),
            "unknown"
        );
    }

    #[test]
    fn should_invert_binary_state_with_conditional() {
        let lookup = states(&[("sensor.foo", "on")]);
        let source = "{{ 'off' if is_state('sensor.foo', 'on') else 'on' }}";
        assert_eq!(render(source, &lookup).unwrap(), "off");
        assert_eq!(
            render("{{ not is_state('sensor.foo', ['off', 'on']) }}", &lookup).unwrap(),
            "False"
        );
    }

    #[test]
    fn should_take_matching_if_branch() {
        let lookup = states(&[("sensor.temp", "21.5")]);
        let source = "{% if states('sensor.temp') | float > 25 %}hot{% elif states('sensor.temp') | float > 18 %}mild{% else %}cold{% endif %}";
        assert_eq!(render(source, &lookup).unwrap(), "mild");
    }

    #[test]
    fn should_read_state_object_fields() {
        let entity_id = EntityId::parse("sensor.kitchen").unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("friendly_name".to_string(), AttributeValue::from("Kitchen"));
        attributes.insert("battery".to_string(), AttributeValue::from(87_i64));
        let lookup: SharedStates = Arc::new(HashMap::from([(
            entity_id.clone(),
            StateSnapshot::new(entity_id, EntityState::parse("12"), attributes, now()),
        )]));

        assert_eq!(
            render("{{ states.sensor.kitchen.name }}", &lookup).unwrap(),
            "Kitchen"
        );
        assert_eq!(
            render("{{ states.sensor.kitchen.attributes.battery + 1 }}", &lookup).unwrap(),
            "88"
        );
        assert_eq!(
            render("{{ state_attr('sensor.kitchen', 'battery') }}", &lookup).unwrap(),
            "87"
        );
        assert_eq!(
            render("{{ is_state_attr('sensor.kitchen', 'battery', 87) }}", &lookup).unwrap(),
            "True"
        );
        assert_eq!(
            render("{{ states.sensor.nope }}", &lookup).unwrap(),
            "None"
        );
    }

    #[test]
    fn should_fail_when_variable_is_undefined() {
        let err = render("{{ missing }}", &empty()).unwrap_err();
        assert!(matches!(err, EvaluationError::Undefined(_)));
    }

    #[test]
    fn should_fall_back_with_default_filter_when_variable_is_undefined() {
        assert_eq!(
            render("{{ missing | default('x') }}", &empty()).unwrap(),
            "x"
        );
    }

    #[test]
    fn should_fail_when_dividing_by_zero() {
        let err = render("{{ 1 / 0 }}", &empty()).unwrap_err();
        assert_eq!(err, EvaluationError::NonFinite);
        assert!(render("{{ 1 % 0 }}", &empty()).is_err());
    }

    #[test]
    fn should_not_panic_on_extreme_remainders() {
        let extreme = render("{{ (-9223372036854775807 - 1) % -1 }}", &empty());
        assert!(extreme.as_deref().map_or(true, |out| out == "0"));
        assert_eq!(
            render("{{ 9223372036854775806 % 9223372036854775807 }}", &empty()).unwrap(),
            "9223372036854775806"
        );
        assert!(render("{{ (-9223372036854775807 - 1) % 0 }}", &empty()).is_err());
    }

    #[test]
    fn should_fail_when_conversion_has_no_default() {
        let err = render("{{ 'abc' | float }}", &empty()).unwrap_err();
        assert!(matches!(err, EvaluationError::Conversion { target: "float", .. }));
        assert_eq!(
            render("{{ 'abc' | float(0) }}", &empty()).unwrap(),
            "0"
        );
        assert_eq!(render("{{ int('12') + 1 }}", &empty()).unwrap(), "13");
    }

    #[test]
    fn should_compute_arithmetic_with_python_formatting() {
        assert_eq!(render("{{ 7 / 2 }}", &empty()).unwrap(), "3.5");
        assert_eq!(render("{{ 4 / 2 }}", &empty()).unwrap(), "2.0");
        assert_eq!(render("{{ -7 % 3 }}", &empty()).unwrap(), "2");
        assert_eq!(render("{{ 2.346 | round(2) }}", &empty()).unwrap(), "2.35");
        assert_eq!(render("{{ 'a' ~ 1 }}", &empty()).unwrap(), "a1");
        assert_eq!(render("{{ true }} {{ none }}", &empty()).unwrap(), "True None");
        assert_eq!(render("{{ false | string | lower }}", &empty()).unwrap(), "false");
    }

    #[test]
    fn should_test_membership_in_lists_and_strings() {
        let lookup = states(&[("sensor.door", "open")]);
        assert_eq!(
            render("{{ states('sensor.door') in ['open', 'ajar'] }}", &lookup).unwrap(),
            "True"
        );
        assert_eq!(render("{{ 'x' not in 'abc' }}", &lookup).unwrap(), "True");
    }

    #[test]
    fn should_use_provided_variables() {
        let template = Template::compile("{{ prefix ~ '-' ~ count * 2 }}").unwrap();
        let variables = Variables::from([
            ("prefix".to_string(), Value::from("n")),
            ("count".to_string(), Value::from(3)),
        ]);
        assert_eq!(template.render(&empty(), &variables).unwrap(), "n-6");
    }

    #[test]
    fn should_let_variables_shadow_states_without_breaking_functions() {
        let lookup = states(&[("sensor.a", "1")]);
        let template = Template::compile("{{ states }} {{ is_state('sensor.a', '1') }}").unwrap();
        let variables = Variables::from([("states".to_string(), Value::from("mine"))]);
        assert_eq!(template.render(&lookup, &variables).unwrap(), "mine True");
    }

    #[test]
    fn should_report_line_of_syntax_error() {
        let err = Template::compile("ok\n{{ (1 + }}").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(matches!(err.reason, SyntaxReason::Invalid(_)));
    }

    #[test]
    fn should_reject_unknown_functions_and_filters() {
        let err = Template::compile("{{ nope(1) }}").unwrap_err();
        assert_eq!(err.reason, SyntaxReason::UnknownFunction("nope".to_string()));

        let err = Template::compile("{{ 1 | reverse }}").unwrap_err();
        assert_eq!(err.reason, SyntaxReason::UnknownFilter("reverse".to_string()));
    }

    #[test]
    fn should_reject_wrong_argument_counts() {
        let err = Template::compile("{% if true %}{{ is_state('sensor.a') }}{% endif %}").unwrap_err();
        assert_eq!(
            err.reason,
            SyntaxReason::Arity {
                name: "is_state".to_string(),
                min: 2,
                max: 2,
                got: 1,
            }
        );
        assert!(Template::compile("{{ 1 | round(1, 2, 3) }}").is_err());
    }

    #[test]
    fn should_convert_rendered_output_to_native_values() {
        assert_eq!(native_value("42"), Value::from(42));
        assert_eq!(native_value("True"), Value::from(true));
        assert!(native_value("None").is_none());
        assert_eq!(native_value("on"), Value::from("on"));
    }

    #[test]
    fn should_detect_template_markup() {
        assert!(is_template("{{ x }}"));
        assert!(is_template("{% if x %}{% endif %}"));
        assert!(!is_template("plain { text }"));
    }
}
