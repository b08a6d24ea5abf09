//! State bus port: the shared store of entity states.
//!
//! Reads and subscriptions are how derived entities observe their sources;
//! publishing is how they expose their own computed state.

use std::collections::BTreeSet;
use std::sync::Arc;

use tmplhub_domain::entity::{Attributes, EntityState, StateLookup, StateSnapshot};
use tmplhub_domain::event::StateChangedEvent;
use tmplhub_domain::id::{EntityId, SubscriptionId};

/// Callback invoked synchronously, in publish order, for every change of a
/// subscribed entity.
///
/// Listeners must return quickly and must not publish on the bus they are
/// registered with.
pub type StateListener = Arc<dyn Fn(&StateChangedEvent) + Send + Sync>;

/// Returned by [`StateBus::subscribe`]; removes the subscription when passed
/// to [`StateBus::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn new(id: SubscriptionId) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Publish/subscribe store keyed by entity id.
pub trait StateBus: Send + Sync {
    /// Current snapshot of `entity_id`, if it was ever published.
    fn get_state(&self, entity_id: &EntityId) -> Option<StateSnapshot>;

    /// Register `listener` for changes of any entity in `entity_ids`.
    fn subscribe(&self, entity_ids: BTreeSet<EntityId>, listener: StateListener) -> SubscriptionHandle;

    /// Remove a subscription. Returns `false` if it was already removed.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool;

    /// Store a new state for `entity_id` and notify its listeners.
    ///
    /// Idempotent: returns `false` and notifies nobody when neither the state
    /// nor the attributes differ from the stored snapshot.
    fn publish(&self, entity_id: &EntityId, state: EntityState, attributes: Attributes) -> bool;
}

impl<T: StateBus + ?Sized> StateBus for Arc<T> {
    fn get_state(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
        (**self).get_state(entity_id)
    }

    fn subscribe(&self, entity_ids: BTreeSet<EntityId>, listener: StateListener) -> SubscriptionHandle {
        (**self).subscribe(entity_ids, listener)
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        (**self).unsubscribe(handle)
    }

    fn publish(&self, entity_id: &EntityId, state: EntityState, attributes: Attributes) -> bool {
        (**self).publish(entity_id, state, attributes)
    }
}

/// Read-only view of a bus, handed to template evaluation.
pub struct BusStates<B: ?Sized>(pub Arc<B>);

impl<B: StateBus + ?Sized> StateLookup for BusStates<B> {
    fn state(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
        self.0.get_state(entity_id)
    }
}
