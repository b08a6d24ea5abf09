//! Per-domain blueprint cache with single-flight loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

use tmplhub_domain::blueprint::{Blueprint, BlueprintError};
use tmplhub_domain::error::TmplHubError;

use crate::ports::BlueprintSource;

type Slot = Arc<OnceCell<Arc<Blueprint>>>;

/// Loads, validates and caches the blueprints of one domain.
///
/// Concurrent [`get`](Self::get) calls for the same uncached path share one
/// load. A failed load leaves nothing behind, so the next caller (including
/// the ones already waiting) tries again.
pub struct BlueprintStore<S> {
    domain: String,
    source: S,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<S: BlueprintSource> BlueprintStore<S> {
    pub fn new(domain: impl Into<String>, source: S) -> Self {
        Self {
            domain: domain.into(),
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the blueprint at `path`, loading and validating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BlueprintError::NotFound`] when the source has no such path,
    /// [`BlueprintError::Invalid`] when the document is not a valid blueprint
    /// of this domain, or the source's own error.
    pub async fn get(&self, path: &str) -> Result<Arc<Blueprint>, TmplHubError> {
        let slot = self.slots().entry(path.to_string()).or_default().clone();
        let blueprint = slot.get_or_try_init(|| self.load(path)).await?;
        Ok(blueprint.clone())
    }

    async fn load(&self, path: &str) -> Result<Arc<Blueprint>, TmplHubError> {
        tracing::debug!(domain = %self.domain, path, "loading blueprint");
        let document = self
            .source
            .load(&self.domain, path)
            .await?
            .ok_or_else(|| BlueprintError::NotFound { path: path.to_string() })?;
        let blueprint = Blueprint::from_document(&self.domain, path, &document).map_err(|source| {
            BlueprintError::Invalid {
                path: path.to_string(),
                source,
            }
        })?;
        tracing::info!(
            domain = %self.domain,
            path,
            inputs = blueprint.inputs().len(),
            "blueprint loaded"
        );
        Ok(Arc::new(blueprint))
    }

    /// Paths available in the source for this domain. Nothing is loaded.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    pub async fn list(&self) -> Result<Vec<String>, TmplHubError> {
        self.source.list(&self.domain).await
    }

    /// Paths currently cached, sorted.
    #[must_use]
    pub fn cached(&self) -> Vec<String> {
        let mut paths: Vec<_> = self
            .slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Drop the cached blueprint at `path`. Returns whether one was cached.
    ///
    /// Callers already holding the old `Arc<Blueprint>` keep using it.
    pub fn invalidate(&self, path: &str) -> bool {
        self.slots()
            .remove(path)
            .is_some_and(|slot| slot.initialized())
    }

    /// Drop every cached blueprint.
    pub fn reload(&self) {
        let dropped = std::mem::take(&mut *self.slots());
        tracing::info!(domain = %self.domain, dropped = dropped.len(), "blueprint cache cleared");
    }
}
