//! # tmplhubd
//!
//! Composition root that wires the state bus, the blueprint sources and the
//! `template` integration together, then runs until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize logging
//! - Seed the state bus with the configured states
//! - Stack user blueprints on disk over the builtin ones
//! - Set up the `template` integration and log every state change
//! - Tear everything down on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use tmplhub_adapter_blueprint_fs::{BuiltinBlueprintSource, FsBlueprintSource, LayeredSource};
use tmplhub_app::blueprint_store::BlueprintStore;
use tmplhub_app::ports::{Integration, StateBus};
use tmplhub_app::runtime::TemplateRuntime;
use tmplhub_app::state_bus::InMemoryStateBus;
use tmplhub_app::template_integration::{DOMAIN, TemplateIntegration};
use tmplhub_domain::entity::Attributes;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // State bus
    let bus = Arc::new(InMemoryStateBus::new(config.runtime.bus_capacity));
    for (entity_id, state) in config.seed_states() {
        bus.publish(&entity_id, state, Attributes::new());
    }
    let mut events = BroadcastStream::new(bus.events());

    // Blueprints
    let source = LayeredSource::new(
        FsBlueprintSource::new(&config.blueprints.dir),
        BuiltinBlueprintSource,
    );
    let store = Arc::new(BlueprintStore::new(DOMAIN, source));
    let available = store.list().await?;
    tracing::info!(
        dir = %config.blueprints.dir.display(),
        blueprints = ?available,
        "blueprint sources ready"
    );

    // Template integration
    let runtime = Arc::new(TemplateRuntime::new(bus.clone(), config.runtime_config()));
    let mut integration = TemplateIntegration::new(config.template_entries(), store, runtime.clone());
    let report = integration.setup().await?;
    if !report.is_complete() {
        tracing::warn!(
            failed = report.failures.len(),
            "some template entries were rejected"
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                tracing::info!("shutdown requested");
                break;
            }
            Some(item) = events.next() => match item {
                Ok(event) => tracing::info!(
                    entity_id = %event.entity_id,
                    state = %event.new_state.state,
                    "state changed"
                ),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "state change log lagging behind");
                }
            },
        }
    }

    integration.teardown().await?;
    runtime.teardown_all().await;
    tracing::info!(subscriptions = bus.subscription_count(), "stopped");
    Ok(())
}
