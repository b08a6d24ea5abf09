//! In-process state bus.
//!
//! Listeners are indexed by the entity ids they subscribed to, so a publish
//! only reaches the subscriptions that depend on the changed entity. Every
//! change is additionally broadcast on a tokio [`broadcast`] channel for
//! observers that want the full stream (logging, dashboards).

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use tmplhub_domain::entity::{Attributes, EntityState, StateSnapshot};
use tmplhub_domain::event::StateChangedEvent;
use tmplhub_domain::id::{EntityId, SubscriptionId};
use tmplhub_domain::time::now;

use crate::ports::{StateBus, StateListener, SubscriptionHandle};

struct Subscription {
    entity_ids: BTreeSet<EntityId>,
    listener: StateListener,
}

#[derive(Default)]
struct Inner {
    states: HashMap<EntityId, StateSnapshot>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    by_entity: HashMap<EntityId, BTreeSet<SubscriptionId>>,
}

/// State bus living in the process memory.
///
/// Publishing is serialised: listeners of one change have all returned before
/// the next change is applied, so every listener observes changes in publish
/// order. Listeners are called outside the state lock and may read the bus or
/// (un)subscribe, but must not publish.
pub struct InMemoryStateBus {
    inner: Mutex<Inner>,
    delivery: Mutex<()>,
    sender: broadcast::Sender<StateChangedEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStateBus {
    /// Create a new bus whose broadcast channel keeps up to `capacity` events
    /// for lagging observers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Mutex::new(Inner::default()),
            delivery: Mutex::new(()),
            sender,
        }
    }

    /// Receive every change published *after* this call.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StateChangedEvent> {
        self.sender.subscribe()
    }

    /// Snapshots of every known entity, sorted by id.
    #[must_use]
    pub fn states(&self) -> Vec<StateSnapshot> {
        let mut states: Vec<_> = lock(&self.inner).states.values().cloned().collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner).subscriptions.len()
    }

    /// Number of live subscriptions listening to `entity_id`.
    #[must_use]
    pub fn listener_count(&self, entity_id: &EntityId) -> usize {
        lock(&self.inner).by_entity.get(entity_id).map_or(0, BTreeSet::len)
    }
}

impl Default for InMemoryStateBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StateBus for InMemoryStateBus {
    fn get_state(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
        lock(&self.inner).states.get(entity_id).cloned()
    }

    fn subscribe(&self, entity_ids: BTreeSet<EntityId>, listener: StateListener) -> SubscriptionHandle {
        let id = SubscriptionId::new();
        let mut inner = lock(&self.inner);
        for entity_id in &entity_ids {
            inner.by_entity.entry(entity_id.clone()).or_default().insert(id);
        }
        tracing::debug!(subscription = %id, entities = entity_ids.len(), "subscribed");
        inner.subscriptions.insert(id, Subscription { entity_ids, listener });
        SubscriptionHandle::new(id)
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut inner = lock(&self.inner);
        let Some(subscription) = inner.subscriptions.remove(&handle.id()) else {
            return false;
        };
        for entity_id in &subscription.entity_ids {
            if let Some(ids) = inner.by_entity.get_mut(entity_id) {
                ids.remove(&handle.id());
                if ids.is_empty() {
                    inner.by_entity.remove(entity_id);
                }
            }
        }
        tracing::debug!(subscription = %handle.id(), "unsubscribed");
        true
    }

    fn publish(&self, entity_id: &EntityId, state: EntityState, attributes: Attributes) -> bool {
        let _delivery = lock(&self.delivery);

        let (event, listeners) = {
            let mut inner = lock(&self.inner);
            let ts = now();
            let old = inner.states.get(entity_id).cloned();
            let new = match &old {
                Some(current) => {
                    let mut next = current.clone();
                    if !next.update(state, attributes, ts) {
                        return false;
                    }
                    next
                }
                None => StateSnapshot::new(entity_id.clone(), state, attributes, ts),
            };
            inner.states.insert(entity_id.clone(), new.clone());

            let listeners: Vec<StateListener> = inner
                .by_entity
                .get(entity_id)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.subscriptions.get(id))
                .map(|subscription| subscription.listener.clone())
                .collect();
            (StateChangedEvent::new(old, new), listeners)
        };

        tracing::trace!(entity_id = %entity_id, state = %event.new_state.state, "state changed");
        for listener in &listeners {
            listener(&event);
        }
        // broadcast::send fails only when there are zero receivers,
        // which only means nobody is observing.
        let _ = self.sender.send(event);
        true
    }
}
