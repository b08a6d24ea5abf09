//! Two sources stacked on each other.

use tmplhub_app::ports::BlueprintSource;
use tmplhub_domain::document::Document;
use tmplhub_domain::error::TmplHubError;

/// Looks a blueprint up in `primary` first, then in `fallback`.
///
/// Used to let user blueprints on disk shadow the builtin ones.
#[derive(Debug, Clone)]
pub struct LayeredSource<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> LayeredSource<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: BlueprintSource, F: BlueprintSource> BlueprintSource for LayeredSource<P, F> {
    async fn load(&self, domain: &str, path: &str) -> Result<Option<Document>, TmplHubError> {
        if let Some(document) = self.primary.load(domain, path).await? {
            return Ok(Some(document));
        }
        self.fallback.load(domain, path).await
    }

    async fn list(&self, domain: &str) -> Result<Vec<String>, TmplHubError> {
        let mut paths = self.primary.list(domain).await?;
        paths.extend(self.fallback.list(domain).await?);
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}
