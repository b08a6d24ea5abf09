//! Event: an immutable record of a state change on the bus.

use serde::{Deserialize, Serialize};

use crate::entity::StateSnapshot;
use crate::id::{EntityId, EventId};

/// Emitted by the state bus whenever an entity's state or attributes change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub id: EventId,
    pub entity_id: EntityId,
    /// `None` when the entity did not exist before.
    pub old_state: Option<StateSnapshot>,
    pub new_state: StateSnapshot,
}

impl StateChangedEvent {
    #[must_use]
    pub fn new(old_state: Option<StateSnapshot>, new_state: StateSnapshot) -> Self {
        Self {
            id: EventId::new(),
            entity_id: new_state.entity_id.clone(),
            old_state,
            new_state,
        }
    }

    /// Whether the state value itself changed (as opposed to attributes only).
    #[must_use]
    pub fn state_changed(&self) -> bool {
        self.old_state
            .as_ref()
            .is_none_or(|old| old.state != self.new_state.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AttributeValue, Attributes, EntityState};
    use crate::time::now;

    fn snap(state: EntityState, attributes: Attributes) -> StateSnapshot {
        StateSnapshot::new(
            EntityId::parse("sensor.outside").unwrap(),
            state,
            attributes,
            now(),
        )
    }

    #[test]
    fn should_report_state_change_for_new_entity() {
        let event = StateChangedEvent::new(None, snap(EntityState::On, Attributes::new()));
        assert!(event.state_changed());
        assert_eq!(event.entity_id.as_str(), "sensor.outside");
    }

    #[test]
    fn should_not_report_state_change_when_only_attributes_moved() {
        let mut attrs = Attributes::new();
        attrs.insert("unit".to_string(), AttributeValue::from("C"));
        let event = StateChangedEvent::new(
            Some(snap(EntityState::On, Attributes::new())),
            snap(EntityState::On, attrs),
        );
        assert!(!event.state_changed());
    }
}
