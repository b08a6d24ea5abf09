//! Reactive template entity runtime.
//!
//! Each active entity owns one subscription on the union of its template
//! dependencies, a recompute channel of capacity 1 and a worker task. The
//! subscription listener only `try_send`s a signal: when a signal is already
//! queued the change coalesces into it, and the worker re-evaluates against
//! whatever the bus holds when it gets to run.
//!
//! Lifecycle per entity: `Uninitialized → Active → TornDown`. Publishing
//! checks the phase under the same lock teardown takes, so nothing reaches
//! the bus once an entity is torn down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tmplhub_domain::entity::{Attributes, EntityState, SharedStates};
use tmplhub_domain::error::RuntimeError;
use tmplhub_domain::event::StateChangedEvent;
use tmplhub_domain::id::EntityId;
use tmplhub_domain::template::Dependencies;
use tmplhub_domain::template_entity::TemplateEntityConfig;

use crate::ports::{BusStates, StateBus, StateListener, SubscriptionHandle};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Period at which entities with dynamic references are recomputed.
    /// `None` disables periodic refresh.
    pub dynamic_refresh: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Active,
    TornDown,
}

/// Per-entity evaluation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub evaluation_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

/// Counts recompute signals that were queued but not yet processed.
#[derive(Clone)]
struct WorkTracker {
    pending: Arc<watch::Sender<usize>>,
}

impl WorkTracker {
    fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            pending: Arc::new(pending),
        }
    }

    fn started(&self) {
        self.pending.send_modify(|count| *count += 1);
    }

    fn finished(&self) {
        self.pending.send_modify(|count| *count = count.saturating_sub(1));
    }

    async fn idle(&self) {
        let mut receiver = self.pending.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

/// Queue a recompute unless one is already pending.
fn signal(sender: &mpsc::Sender<()>, tracker: &WorkTracker) {
    tracker.started();
    if sender.try_send(()).is_err() {
        // full: coalesced into the queued signal; closed: the worker is gone
        tracker.finished();
    }
}

/// State shared between the runtime and the entity's worker.
struct EntityCell {
    config: TemplateEntityConfig,
    phase: Mutex<Phase>,
    diagnostics: Mutex<Diagnostics>,
}

impl EntityCell {
    fn new(config: TemplateEntityConfig) -> Self {
        Self {
            config,
            phase: Mutex::new(Phase::Uninitialized),
            diagnostics: Mutex::new(Diagnostics::default()),
        }
    }

    fn entity_id(&self) -> &EntityId {
        &self.config.entity_id
    }

    fn set_phase(&self, phase: Phase) {
        *lock(&self.phase) = phase;
    }

    fn is_active(&self) -> bool {
        *lock(&self.phase) == Phase::Active
    }

    /// Evaluate against the current bus contents and publish the result.
    ///
    /// Returns whether the bus state changed.
    fn recompute<B: StateBus + ?Sized + 'static>(&self, bus: &Arc<B>) -> Result<bool, RuntimeError> {
        let states: SharedStates = Arc::new(BusStates(bus.clone()));
        let (state, attributes) = match self.config.evaluate(&states) {
            Ok(computed) => {
                lock(&self.diagnostics).evaluation_count += 1;
                (computed.state, computed.attributes)
            }
            Err(err) => {
                tracing::warn!(entity_id = %self.entity_id(), %err, "template evaluation failed");
                self.record_failure(err.to_string());
                (EntityState::Unavailable, self.config.static_attributes())
            }
        };
        self.publish(bus.as_ref(), state, attributes)
    }

    /// Publish `unavailable` after an evaluation that never returned.
    fn fail<B: StateBus + ?Sized>(&self, bus: &B, reason: String) -> Result<bool, RuntimeError> {
        tracing::error!(entity_id = %self.entity_id(), %reason, "template evaluation aborted");
        self.record_failure(reason);
        self.publish(bus, EntityState::Unavailable, self.config.static_attributes())
    }

    fn record_failure(&self, reason: String) {
        let mut diagnostics = lock(&self.diagnostics);
        diagnostics.evaluation_count += 1;
        diagnostics.error_count += 1;
        diagnostics.last_error = Some(reason);
    }

    fn publish<B: StateBus + ?Sized>(
        &self,
        bus: &B,
        state: EntityState,
        attributes: Attributes,
    ) -> Result<bool, RuntimeError> {
        let phase = lock(&self.phase);
        if *phase != Phase::Active {
            let err = RuntimeError::PublishAfterTeardown {
                entity_id: self.entity_id().clone(),
            };
            tracing::error!(%err, phase = ?*phase, "publish refused");
            return Err(err);
        }
        Ok(bus.publish(self.entity_id(), state, attributes))
    }
}

/// Marks one received signal as processed when dropped, unwinding included.
struct Processing<'a>(&'a WorkTracker);

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.finished();
    }
}

/// The worker's end of the recompute channel. Signals still queued when it
/// is dropped are counted as processed.
struct Inbox {
    signals: mpsc::Receiver<()>,
    tracker: WorkTracker,
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.signals.close();
        while self.signals.try_recv().is_ok() {
            self.tracker.finished();
        }
    }
}

async fn run_worker<B: StateBus + ?Sized + 'static>(cell: Arc<EntityCell>, bus: Arc<B>, mut inbox: Inbox) {
    while inbox.signals.recv().await.is_some() {
        let _processing = Processing(&inbox.tracker);
        if !cell.is_active() {
            continue;
        }
        let evaluation = tokio::spawn({
            let cell = cell.clone();
            let bus = bus.clone();
            async move { cell.recompute(&bus) }
        });
        let published = match evaluation.await {
            Ok(outcome) => outcome,
            Err(err) => cell.fail(bus.as_ref(), err.to_string()),
        };
        if let Ok(true) = published {
            tracing::trace!(entity_id = %cell.entity_id(), "state published");
        }
    }
    tracing::debug!(entity_id = %cell.entity_id(), "worker stopped");
}

async fn run_ticker(period: Duration, sender: mpsc::Sender<()>, tracker: WorkTracker) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        signal(&sender, &tracker);
    }
}

struct ActiveEntity {
    cell: Arc<EntityCell>,
    dependencies: Dependencies,
    subscription: SubscriptionHandle,
    sender: mpsc::Sender<()>,
    worker: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
}

impl ActiveEntity {
    async fn shutdown<B: StateBus + ?Sized>(self, bus: &B) {
        let entity_id = self.cell.entity_id().clone();
        self.cell.set_phase(Phase::TornDown);
        bus.unsubscribe(&self.subscription);
        if let Some(ticker) = self.ticker {
            ticker.abort();
            let _ = ticker.await;
        }
        drop(self.sender);
        if let Err(err) = self.worker.await {
            tracing::error!(entity_id = %entity_id, %err, "entity worker failed");
        }
        tracing::info!(entity_id = %entity_id, "entity torn down");
    }
}

/// Keeps template entities in sync with the states they read.
pub struct TemplateRuntime<B> {
    bus: Arc<B>,
    config: RuntimeConfig,
    tracker: WorkTracker,
    entities: Mutex<HashMap<EntityId, ActiveEntity>>,
}

impl<B: StateBus + 'static> TemplateRuntime<B> {
    pub fn new(bus: Arc<B>, config: RuntimeConfig) -> Self {
        Self {
            bus,
            config,
            tracker: WorkTracker::new(),
            entities: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Activate an entity: subscribe to its dependencies, publish its initial
    /// state and spawn its worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyActive`] when an entity with the same id
    /// is already running.
    pub fn activate(&self, config: TemplateEntityConfig) -> Result<EntityId, RuntimeError> {
        let entity_id = config.entity_id.clone();
        let mut entities = lock(&self.entities);
        if entities.contains_key(&entity_id) {
            return Err(RuntimeError::AlreadyActive(entity_id));
        }

        let dependencies = config.dependencies();
        let cell = Arc::new(EntityCell::new(config));

        let (sender, receiver) = mpsc::channel(1);
        let listener: StateListener = {
            let sender = sender.clone();
            let tracker = self.tracker.clone();
            Arc::new(move |_event: &StateChangedEvent| signal(&sender, &tracker))
        };
        let subscription = self.bus.subscribe(dependencies.entities.clone(), listener);

        cell.set_phase(Phase::Active);
        if let Err(err) = cell.recompute(&self.bus) {
            tracing::error!(entity_id = %entity_id, %err, "initial publish failed");
        }

        let inbox = Inbox {
            signals: receiver,
            tracker: self.tracker.clone(),
        };
        let worker = tokio::spawn(run_worker(cell.clone(), self.bus.clone(), inbox));
        let ticker = match self.config.dynamic_refresh {
            Some(period) if dependencies.dynamic => Some(tokio::spawn(run_ticker(
                period,
                sender.clone(),
                self.tracker.clone(),
            ))),
            _ => None,
        };

        tracing::info!(
            entity_id = %entity_id,
            dependencies = dependencies.entities.len(),
            dynamic = dependencies.dynamic,
            "entity activated"
        );
        entities.insert(
            entity_id.clone(),
            ActiveEntity {
                cell,
                dependencies,
                subscription,
                sender,
                worker,
                ticker,
            },
        );
        Ok(entity_id)
    }

    /// Tear an entity down: no publish from it reaches the bus afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EntityNotFound`] when no such entity is active.
    pub async fn teardown(&self, entity_id: &EntityId) -> Result<(), RuntimeError> {
        let removed = lock(&self.entities).remove(entity_id);
        let Some(entity) = removed else {
            return Err(RuntimeError::EntityNotFound(entity_id.clone()));
        };
        entity.shutdown(&*self.bus).await;
        Ok(())
    }

    /// Tear down every active entity.
    pub async fn teardown_all(&self) {
        let mut drained: Vec<_> = lock(&self.entities).drain().collect();
        drained.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (_, entity) in drained {
            entity.shutdown(&*self.bus).await;
        }
    }

    /// Request a recompute of `entity_id`, coalesced like any dependency change.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EntityNotFound`] when no such entity is active.
    pub fn refresh(&self, entity_id: &EntityId) -> Result<(), RuntimeError> {
        let entities = lock(&self.entities);
        let entity = entities
            .get(entity_id)
            .ok_or_else(|| RuntimeError::EntityNotFound(entity_id.clone()))?;
        signal(&entity.sender, &self.tracker);
        Ok(())
    }

    /// Wait until every queued recompute has been processed, including the
    /// ones triggered by those recomputes.
    pub async fn block_till_done(&self) {
        self.tracker.idle().await;
    }

    /// Ids of the active entities, sorted.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = lock(&self.entities).keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn is_active(&self, entity_id: &EntityId) -> bool {
        lock(&self.entities).contains_key(entity_id)
    }

    #[must_use]
    pub fn dependencies(&self, entity_id: &EntityId) -> Option<Dependencies> {
        lock(&self.entities)
            .get(entity_id)
            .map(|entity| entity.dependencies.clone())
    }

    #[must_use]
    pub fn diagnostics(&self, entity_id: &EntityId) -> Option<Diagnostics> {
        lock(&self.entities)
            .get(entity_id)
            .map(|entity| lock(&entity.cell.diagnostics).clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;
    use tmplhub_domain::document::Document;
    use tmplhub_domain::entity::{Attributes, AttributeValue, StateSnapshot};
    use tmplhub_domain::schema::DocPath;
    use tmplhub_domain::template_entity::Platform;

    use super::*;
    use crate::state_bus::InMemoryStateBus;

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    fn entity(platform: Platform, value: serde_json::Value) -> TemplateEntityConfig {
        TemplateEntityConfig::from_document(platform, &Document::from(value), &DocPath::root()).unwrap()
    }

    fn inverted(source: &str, name: &str) -> TemplateEntityConfig {
        entity(
            Platform::BinarySensor,
            json!({"name": name, "state": format!("{{{{ not is_state('{source}', 'on') }}}}")}),
        )
    }

    fn runtime() -> TemplateRuntime<InMemoryStateBus> {
        TemplateRuntime::new(Arc::new(InMemoryStateBus::default()), RuntimeConfig::default())
    }

    fn set(runtime: &TemplateRuntime<InMemoryStateBus>, entity_id: &str, state: &str) {
        runtime
            .bus()
            .publish(&id(entity_id), EntityState::parse(state), Attributes::new());
    }

    fn state(runtime: &TemplateRuntime<InMemoryStateBus>, entity_id: &str) -> Option<String> {
        runtime
            .bus()
            .get_state(&id(entity_id))
            .map(|snapshot| snapshot.state.to_string())
    }

    fn evaluations(runtime: &TemplateRuntime<InMemoryStateBus>, entity_id: &str) -> u64 {
        runtime.diagnostics(&id(entity_id)).unwrap().evaluation_count
    }

    #[tokio::test]
    async fn should_publish_initial_state_when_activated() {
        let runtime = runtime();
        set(&runtime, "binary_sensor.foo", "on");

        let entity_id = runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();

        assert_eq!(entity_id.as_str(), "binary_sensor.inverted_foo");
        assert_eq!(state(&runtime, "binary_sensor.inverted_foo").as_deref(), Some("off"));
        assert_eq!(
            runtime
                .bus()
                .get_state(&entity_id)
                .unwrap()
                .get_attribute("friendly_name"),
            Some(&AttributeValue::from("Inverted foo"))
        );
        assert_eq!(evaluations(&runtime, "binary_sensor.inverted_foo"), 1);
    }

    #[tokio::test]
    async fn should_recompute_when_dependency_changes() {
        let runtime = runtime();
        set(&runtime, "binary_sensor.foo", "on");
        runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();

        set(&runtime, "binary_sensor.foo", "off");
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "binary_sensor.inverted_foo").as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn should_only_recompute_entities_depending_on_change() {
        let runtime = runtime();
        runtime.activate(inverted("binary_sensor.a", "Inverted a")).unwrap();
        runtime.activate(inverted("binary_sensor.b", "Inverted b")).unwrap();

        set(&runtime, "binary_sensor.a", "on");
        runtime.block_till_done().await;

        assert_eq!(evaluations(&runtime, "binary_sensor.inverted_a"), 2);
        assert_eq!(evaluations(&runtime, "binary_sensor.inverted_b"), 1);
    }

    #[tokio::test]
    async fn should_coalesce_changes_queued_before_worker_runs() {
        let runtime = runtime();
        let mirror = entity(
            Platform::Sensor,
            json!({"name": "Mirror", "state": "{{ states('sensor.source') }}"}),
        );
        runtime.activate(mirror).unwrap();

        for value in 1..=5 {
            set(&runtime, "sensor.source", &value.to_string());
        }
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "sensor.mirror").as_deref(), Some("5"));
        assert_eq!(evaluations(&runtime, "sensor.mirror"), 2);
    }

    #[tokio::test]
    async fn should_follow_chains_of_template_entities() {
        let runtime = runtime();
        set(&runtime, "binary_sensor.foo", "on");
        runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();
        runtime
            .activate(inverted("binary_sensor.inverted_foo", "Double inverted foo"))
            .unwrap();
        assert_eq!(state(&runtime, "binary_sensor.double_inverted_foo").as_deref(), Some("on"));

        set(&runtime, "binary_sensor.foo", "off");
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "binary_sensor.inverted_foo").as_deref(), Some("on"));
        assert_eq!(state(&runtime, "binary_sensor.double_inverted_foo").as_deref(), Some("off"));
    }

    #[tokio::test]
    async fn should_become_unavailable_when_evaluation_fails() {
        let runtime = runtime();
        let doubled = entity(
            Platform::Sensor,
            json!({"name": "Doubled", "state": "{{ states('sensor.raw') | float * 2 }}"}),
        );
        runtime.activate(doubled).unwrap();

        assert_eq!(state(&runtime, "sensor.doubled").as_deref(), Some("unavailable"));
        let diagnostics = runtime.diagnostics(&id("sensor.doubled")).unwrap();
        assert_eq!(diagnostics.error_count, 1);
        assert!(diagnostics.last_error.is_some());
        assert_eq!(runtime.bus().listener_count(&id("sensor.raw")), 1);

        set(&runtime, "sensor.raw", "2");
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "sensor.doubled").as_deref(), Some("4.0"));
    }

    #[tokio::test]
    async fn should_not_publish_after_teardown() {
        let runtime = runtime();
        set(&runtime, "binary_sensor.foo", "on");
        let entity_id = runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();

        runtime.teardown(&entity_id).await.unwrap();
        set(&runtime, "binary_sensor.foo", "off");
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "binary_sensor.inverted_foo").as_deref(), Some("off"));
        assert_eq!(runtime.bus().subscription_count(), 0);
        assert!(!runtime.is_active(&entity_id));
        assert_eq!(
            runtime.teardown(&entity_id).await.unwrap_err(),
            RuntimeError::EntityNotFound(entity_id)
        );
    }

    #[tokio::test]
    async fn should_drop_pending_recompute_when_torn_down() {
        let runtime = runtime();
        set(&runtime, "binary_sensor.foo", "on");
        let entity_id = runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();

        set(&runtime, "binary_sensor.foo", "off");
        runtime.teardown(&entity_id).await.unwrap();
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "binary_sensor.inverted_foo").as_deref(), Some("off"));
    }

    /// Bus whose reads of `sensor.trap` panic once armed.
    #[derive(Default)]
    struct TrappedBus {
        inner: InMemoryStateBus,
        armed: AtomicBool,
    }

    impl StateBus for TrappedBus {
        fn get_state(&self, entity_id: &EntityId) -> Option<StateSnapshot> {
            let trapped = self.armed.load(Ordering::SeqCst) && entity_id.as_str() == "sensor.trap";
            assert!(!trapped, "read of a trapped entity");
            self.inner.get_state(entity_id)
        }

        fn subscribe(&self, entity_ids: BTreeSet<EntityId>, listener: StateListener) -> SubscriptionHandle {
            self.inner.subscribe(entity_ids, listener)
        }

        fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
            self.inner.unsubscribe(handle)
        }

        fn publish(&self, entity_id: &EntityId, state: EntityState, attributes: Attributes) -> bool {
            self.inner.publish(entity_id, state, attributes)
        }
    }

    #[tokio::test]
    async fn should_become_unavailable_when_evaluation_panics() {
        let bus = Arc::new(TrappedBus::default());
        let runtime = TemplateRuntime::new(bus.clone(), RuntimeConfig::default());
        let mirror = entity(
            Platform::Sensor,
            json!({"name": "Mirror", "state": "{{ states('sensor.trap') }}"}),
        );
        let entity_id = runtime.activate(mirror).unwrap();

        bus.armed.store(true, Ordering::SeqCst);
        bus.publish(&id("sensor.trap"), EntityState::parse("1"), Attributes::new());
        tokio::time::timeout(Duration::from_secs(5), runtime.block_till_done())
            .await
            .expect("pending work settles after a panicking evaluation");
        assert_eq!(
            bus.inner.get_state(&id("sensor.mirror")).map(|snapshot| snapshot.state),
            Some(EntityState::Unavailable)
        );

        bus.armed.store(false, Ordering::SeqCst);
        bus.publish(&id("sensor.trap"), EntityState::parse("2"), Attributes::new());
        tokio::time::timeout(Duration::from_secs(5), runtime.block_till_done())
            .await
            .expect("worker keeps serving after a panicking evaluation");
        assert_eq!(
            bus.inner.get_state(&id("sensor.mirror")).map(|snapshot| snapshot.state),
            Some(EntityState::parse("2"))
        );
        let diagnostics = runtime.diagnostics(&entity_id).unwrap();
        assert_eq!(diagnostics.evaluation_count, 3);
        assert_eq!(diagnostics.error_count, 1);
        assert!(diagnostics.last_error.unwrap().contains("panicked"));
    }

    #[test]
    fn should_refuse_publish_once_torn_down() {
        let bus = Arc::new(InMemoryStateBus::default());
        let cell = EntityCell::new(inverted("binary_sensor.foo", "Inverted foo"));
        cell.set_phase(Phase::TornDown);

        let err = cell.recompute(&bus).unwrap_err();

        assert_eq!(
            err,
            RuntimeError::PublishAfterTeardown {
                entity_id: id("binary_sensor.inverted_foo")
            }
        );
        assert!(bus.get_state(&id("binary_sensor.inverted_foo")).is_none());
    }

    #[tokio::test]
    async fn should_fail_when_entity_is_already_active() {
        let runtime = runtime();
        runtime.activate(inverted("binary_sensor.foo", "Inverted foo")).unwrap();

        let err = runtime
            .activate(inverted("binary_sensor.bar", "Inverted foo"))
            .unwrap_err();

        assert_eq!(err, RuntimeError::AlreadyActive(id("binary_sensor.inverted_foo")));
        assert_eq!(runtime.entity_ids(), [id("binary_sensor.inverted_foo")]);
    }

    #[tokio::test]
    async fn should_recompute_dynamic_reference_only_on_refresh() {
        let runtime = runtime();
        let dynamic = entity(
            Platform::Sensor,
            json!({
                "name": "Dynamic",
                "variables": {"prefix": "sensor"},
                "state": "{{ states(prefix ~ '.source') }}"
            }),
        );
        let entity_id = runtime.activate(dynamic).unwrap();
        assert!(runtime.dependencies(&entity_id).unwrap().dynamic);

        set(&runtime, "sensor.source", "7");
        runtime.block_till_done().await;
        assert_eq!(state(&runtime, "sensor.dynamic").as_deref(), Some("unknown"));

        runtime.refresh(&entity_id).unwrap();
        runtime.block_till_done().await;
        assert_eq!(state(&runtime, "sensor.dynamic").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn should_refresh_dynamic_entities_periodically() {
        let runtime = TemplateRuntime::new(
            Arc::new(InMemoryStateBus::default()),
            RuntimeConfig {
                dynamic_refresh: Some(Duration::from_millis(10)),
            },
        );
        let dynamic = entity(
            Platform::Sensor,
            json!({
                "name": "Dynamic",
                "variables": {"prefix": "sensor"},
                "state": "{{ states(prefix ~ '.source') }}"
            }),
        );
        runtime.activate(dynamic).unwrap();

        set(&runtime, "sensor.source", "7");
        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.block_till_done().await;

        assert_eq!(state(&runtime, "sensor.dynamic").as_deref(), Some("7"));
        runtime.teardown_all().await;
        assert!(runtime.entity_ids().is_empty());
    }

    #[tokio::test]
    async fn should_fail_refresh_when_entity_is_unknown() {
        let runtime = runtime();
        assert_eq!(
            runtime.refresh(&id("sensor.nope")).unwrap_err(),
            RuntimeError::EntityNotFound(id("sensor.nope"))
        );
    }
}
