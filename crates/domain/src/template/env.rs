//! The minijinja environment every template is compiled into: the state
//! functions, the conversion filters and Python-style output.

use std::sync::Arc;

use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind, Output, State, UndefinedBehavior};

use super::EvaluationError;
use super::objects::StatesObject;

/// Name the single template of an environment is registered under.
pub(crate) const TEMPLATE_NAME: &str = "template";

/// Context key of the `states` namespace as templates see it.
pub(crate) const STATES: &str = "states";

/// Context key functions read the states from. Not a valid identifier, so
/// templates cannot shadow it.
pub(crate) const STATES_HANDLE: &str = "@states";

/// Functions callable from templates, with their accepted argument counts.
pub(crate) const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("states", 1, 1),
    ("is_state", 2, 2),
    ("state_attr", 2, 2),
    ("is_state_attr", 3, 3),
    ("has_value", 1, 1),
    ("float", 1, 2),
    ("int", 1, 2),
    ("bool", 1, 2),
];

/// Filters usable in templates, with their accepted argument counts (the
/// filtered value excluded).
pub(crate) const FILTERS: &[(&str, usize, usize)] = &[
    ("float", 0, 1),
    ("int", 0, 1),
    ("bool", 0, 1),
    ("string", 0, 0),
    ("round", 0, 1),
    ("lower", 0, 0),
    ("upper", 0, 0),
    ("trim", 0, 1),
    ("abs", 0, 0),
    ("default", 0, 2),
];

/// Build an environment holding `source` as its only template.
pub(crate) fn build(source: String) -> Result<Environment<'static>, Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_formatter(format);

    env.add_function("is_state", is_state);
    env.add_function("state_attr", state_attr);
    env.add_function("is_state_attr", is_state_attr);
    env.add_function("has_value", has_value);
    env.add_function("float", float_value);
    env.add_function("int", int_value);
    env.add_function("bool", bool_value);

    env.add_filter("float", float_value);
    env.add_filter("int", int_value);
    env.add_filter("bool", bool_value);
    env.add_filter("string", string);

    env.add_template_owned(TEMPLATE_NAME, source)?;
    Ok(env)
}

fn states(state: &State<'_, '_>) -> Result<Arc<StatesObject>, Error> {
    state
        .lookup(STATES_HANDLE)
        .and_then(|value| value.downcast_object::<StatesObject>())
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "entity states are not available"))
}

fn is_state(state: &State<'_, '_>, entity: &Value, expected: &Value) -> Result<bool, Error> {
    let Some(snapshot) = states(state)?.resolve(entity)? else {
        return Ok(false);
    };
    let actual = Value::from(snapshot.state.as_str());
    if expected.kind() == ValueKind::Seq {
        return Ok(expected.try_iter()?.any(|option| option == actual));
    }
    Ok(*expected == actual)
}

fn state_attr(state: &State<'_, '_>, entity: &Value, name: &str) -> Result<Value, Error> {
    Ok(states(state)?
        .resolve(entity)?
        .and_then(|snapshot| snapshot.get_attribute(name).map(Value::from_serialize))
        .unwrap_or_else(|| Value::from(())))
}

fn is_state_attr(
    state: &State<'_, '_>,
    entity: &Value,
    name: &str,
    expected: &Value,
) -> Result<bool, Error> {
    Ok(states(state)?
        .resolve(entity)?
        .and_then(|snapshot| snapshot.get_attribute(name).map(Value::from_serialize))
        .is_some_and(|actual| actual == *expected))
}

fn has_value(state: &State<'_, '_>, entity: &Value) -> Result<bool, Error> {
    Ok(states(state)?
        .resolve(entity)?
        .is_some_and(|snapshot| snapshot.state.has_value()))
}

fn conversion(value: &Value, target: &'static str) -> Error {
    let err = EvaluationError::Conversion {
        value: display(value),
        target,
    };
    Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}

fn with_default(
    converted: Option<Value>,
    value: &Value,
    default: Option<Value>,
    target: &'static str,
) -> Result<Value, Error> {
    converted.or(default).ok_or_else(|| conversion(value, target))
}

fn to_float(value: &Value) -> Option<f64> {
    match value.kind() {
        ValueKind::Bool => Some(if value.is_true() { 1.0 } else { 0.0 }),
        ValueKind::Number => f64::try_from(value.clone()).ok(),
        ValueKind::String => value.as_str()?.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: &Value) -> Option<i64> {
    let truncate = |float: f64| {
        (float.is_finite() && float.abs() < 9.2e18).then(|| float.trunc() as i64)
    };
    match value.kind() {
        ValueKind::Bool => Some(i64::from(value.is_true())),
        ValueKind::Number => value
            .as_i64()
            .or_else(|| f64::try_from(value.clone()).ok().and_then(truncate)),
        ValueKind::String => {
            let raw = value.as_str()?.trim();
            raw.parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value.kind() {
        ValueKind::Bool | ValueKind::Number => Some(value.is_true()),
        ValueKind::String => match value.as_str()?.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "enable" | "1" => Some(true),
            "false" | "no" | "off" | "disable" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn float_value(value: &Value, default: Option<Value>) -> Result<Value, Error> {
    with_default(to_float(value).map(Value::from), value, default, "float")
}

fn int_value(value: &Value, default: Option<Value>) -> Result<Value, Error> {
    with_default(to_int(value).map(Value::from), value, default, "int")
}

fn bool_value(value: &Value, default: Option<Value>) -> Result<Value, Error> {
    with_default(to_bool(value).map(Value::from), value, default, "bool")
}

fn string(value: &Value) -> String {
    display(value)
}

/// Python spelling of the scalars minijinja renders in lowercase.
fn display(value: &Value) -> String {
    match value.kind() {
        ValueKind::Bool if value.is_true() => "True".to_string(),
        ValueKind::Bool => "False".to_string(),
        ValueKind::None => "None".to_string(),
        _ => value.to_string(),
    }
}

fn format(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    match value.kind() {
        ValueKind::Bool | ValueKind::None => {
            out.write_str(&display(value))?;
            Ok(())
        }
        ValueKind::Number if f64::try_from(value.clone()).is_ok_and(|number| !number.is_finite()) => {
            let err = EvaluationError::NonFinite;
            Err(Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err))
        }
        _ => minijinja::escape_formatter(out, state, value),
    }
}
