//! Blueprint source port: where raw blueprint documents come from.

use std::future::Future;
use std::sync::Arc;

use tmplhub_domain::document::Document;
use tmplhub_domain::error::TmplHubError;

/// Loads decoded blueprint documents by domain and relative path.
///
/// Sources only decode; validation is the store's job.
pub trait BlueprintSource: Send + Sync {
    /// Decode the blueprint at `path` for `domain`.
    ///
    /// Returns `Ok(None)` when the source has no such blueprint.
    fn load(
        &self,
        domain: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<Document>, TmplHubError>> + Send;

    /// Paths of every blueprint available for `domain`, sorted.
    fn list(&self, domain: &str) -> impl Future<Output = Result<Vec<String>, TmplHubError>> + Send;
}

impl<T: BlueprintSource> BlueprintSource for Arc<T> {
    fn load(
        &self,
        domain: &str,
        path: &str,
    ) -> impl Future<Output = Result<Option<Document>, TmplHubError>> + Send {
        (**self).load(domain, path)
    }

    fn list(&self, domain: &str) -> impl Future<Output = Result<Vec<String>, TmplHubError>> + Send {
        (**self).list(domain)
    }
}
