//! Entity states as seen from inside a template.
//!
//! `states` is callable (`states('sensor.x')`) and narrows by attribute
//! access (`states.sensor.x`). Both paths end in a [`StateObject`], which is
//! also what `this` is bound to.

use std::fmt;
use std::sync::Arc;

use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};

use crate::entity::{SharedStates, StateSnapshot};
use crate::id::EntityId;
use crate::time::to_template_string;

/// Root of the `states` namespace.
pub(crate) struct StatesObject {
    states: SharedStates,
}

impl StatesObject {
    pub(crate) fn new(states: SharedStates) -> Self {
        Self { states }
    }

    /// Snapshot named by an entity id string or a state object.
    ///
    /// Strings that are not valid entity ids resolve to nothing.
    pub(crate) fn resolve(&self, reference: &Value) -> Result<Option<StateSnapshot>, Error> {
        if let Some(object) = reference.downcast_object_ref::<StateObject>() {
            return Ok(self.states.state(&object.0.entity_id));
        }
        match reference.as_str() {
            Some(raw) => Ok(EntityId::parse(raw)
                .ok()
                .and_then(|entity_id| self.states.state(&entity_id))),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot look up an entity from a {} value", reference.kind()),
            )),
        }
    }
}

impl fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<states>")
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let domain = key.as_str()?;
        Some(Value::from_object(DomainObject {
            states: self.states.clone(),
            domain: domain.to_string(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        let [reference] = args else {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("states() takes 1 argument, got {}", args.len()),
            ));
        };
        let state = self
            .resolve(reference)?
            .map_or_else(|| "unknown".to_string(), |snapshot| snapshot.state.to_string());
        Ok(Value::from(state))
    }
}

/// `states.<domain>`: resolves object ids within one domain.
struct DomainObject {
    states: SharedStates,
    domain: String,
}

impl fmt::Debug for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<states.{}>", self.domain)
    }
}

impl Object for DomainObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let object_id = key.as_str()?;
        let snapshot = EntityId::parse(format!("{}.{object_id}", self.domain))
            .ok()
            .and_then(|entity_id| self.states.state(&entity_id));
        Some(snapshot.map_or_else(|| Value::from(()), state_value))
    }
}

const STATE_FIELDS: &[&str] = &[
    "entity_id",
    "domain",
    "object_id",
    "name",
    "state",
    "attributes",
    "last_changed",
    "last_updated",
];

/// One entity's snapshot.
#[derive(Debug)]
pub(crate) struct StateObject(StateSnapshot);

impl Object for StateObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let snapshot = &self.0;
        let value = match key.as_str()? {
            "entity_id" => Value::from(snapshot.entity_id.as_str()),
            "domain" => Value::from(snapshot.entity_id.domain()),
            "object_id" => Value::from(snapshot.entity_id.object_id()),
            "name" => Value::from(snapshot.name()),
            "state" => Value::from(snapshot.state.as_str()),
            "attributes" => Value::from_serialize(&snapshot.attributes),
            "last_changed" => Value::from(to_template_string(&snapshot.last_changed)),
            "last_updated" => Value::from(to_template_string(&snapshot.last_updated)),
            _ => return None,
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(STATE_FIELDS)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<state {}={}>", self.0.entity_id, self.0.state)
    }
}

/// Wrap a snapshot as a template value.
#[must_use]
pub fn state_value(snapshot: StateSnapshot) -> Value {
    Value::from_object(StateObject(snapshot))
}
