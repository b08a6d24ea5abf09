//! Integration port: lifecycle of a configured integration.
//!
//! An integration turns a section of the configuration into live entities on
//! the state bus, and removes them again on shutdown.

use std::future::Future;

use tmplhub_domain::error::TmplHubError;
use tmplhub_domain::id::EntityId;
use tmplhub_domain::schema::DocPath;

/// Outcome of [`Integration::setup`].
///
/// Entries fail independently: one broken entry never prevents its siblings
/// from being activated.
#[derive(Debug, Default)]
pub struct SetupReport {
    /// Entities activated, in configuration order.
    pub activated: Vec<EntityId>,
    /// Entries that could not be set up, with their location.
    pub failures: Vec<(DocPath, TmplHubError)>,
}

impl SetupReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A pluggable integration.
///
/// The binary crate calls the lifecycle methods in order:
///
/// 1. [`setup`](Self::setup): validate the configuration and activate entities
/// 2. (the daemon runs, entities recompute in the background)
/// 3. [`teardown`](Self::teardown): deactivate everything set up
pub trait Integration {
    /// Unique name identifying this integration (e.g. `"template"`).
    fn name(&self) -> &'static str;

    /// Activate every configured entry.
    ///
    /// Per-entry failures are collected in the report; an `Err` means the
    /// integration as a whole could not start.
    fn setup(&mut self) -> impl Future<Output = Result<SetupReport, TmplHubError>> + Send;

    /// Called on graceful shutdown. Tear down everything [`setup`](Self::setup) activated.
    fn teardown(&mut self) -> impl Future<Output = Result<(), TmplHubError>> + Send;
}
