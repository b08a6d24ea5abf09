//! Entity: a state holder on the state bus.
//!
//! Every entity is identified by an [`EntityId`] and carries a discrete
//! [`EntityState`] plus free-form typed attributes. Snapshots are what the
//! bus stores and what templates read.

mod attribute_value;
mod state;

pub use attribute_value::AttributeValue;
pub use state::EntityState;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::time::Timestamp;

/// Attribute mapping, ordered by key so equality and rendering are stable.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Current state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub entity_id: EntityId,
    pub state: EntityState,
    pub attributes: Attributes,
    pub last_changed: Timestamp,
    pub last_updated: Timestamp,
}

impl StateSnapshot {
    /// Create a snapshot whose timestamps are both `ts`.
    #[must_use]
    pub fn new(entity_id: EntityId, state: EntityState, attributes: Attributes, ts: Timestamp) -> Self {
        Self {
            entity_id,
            state,
            attributes,
            last_changed: ts,
            last_updated: ts,
        }
    }

    /// Look up an attribute value by key.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// The `friendly_name` attribute, falling back to the object id.
    #[must_use]
    pub fn name(&self) -> &str {
        match self.attributes.get("friendly_name") {
            Some(AttributeValue::String(name)) => name,
            _ => self.entity_id.object_id(),
        }
    }

    /// Whether applying `state` and `attributes` would change this snapshot.
    #[must_use]
    pub fn differs(&self, state: &EntityState, attributes: &Attributes) -> bool {
        self.state != *state || self.attributes != *attributes
    }

    /// Apply a new state and attributes at `ts`.
    ///
    /// `last_changed` moves only when the state value changes, `last_updated`
    /// whenever anything does. Returns `false` (and leaves the snapshot
    /// untouched) when nothing changed.
    pub fn update(&mut self, state: EntityState, attributes: Attributes, ts: Timestamp) -> bool {
        if !self.differs(&state, &attributes) {
            return false;
        }
        if self.state != state {
            self.last_changed = ts;
        }
        self.last_updated = ts;
        self.state = state;
        self.attributes = attributes;
        true
    }
}

/// Read-only access to current entity states.
///
/// Template evaluation only ever reads through this trait, so it cannot
/// write to the bus.
pub trait StateLookup: Send + Sync {
    /// Current snapshot of `entity_id`, if the entity exists.
    fn state(&self, entity_id: &EntityId) -> Option<StateSnapshot>;
}

/// A lookup shared with the values a template hands around while rendering.
pub type SharedStates = Arc<dyn StateLookup>;

impl StateLookup for HashMap<EntityId, StateSnapshot> {
    fn state(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
        self.get(entity_id).cloned()
    }
}
