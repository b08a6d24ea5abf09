//! Blueprints embedded in the binary.

use tmplhub_app::ports::BlueprintSource;
use tmplhub_domain::document::Document;
use tmplhub_domain::error::TmplHubError;

use crate::decode::decode;

/// `(domain, path, content)` of every builtin blueprint.
const BUILTIN: &[(&str, &str, &str)] = &[(
    "template",
    "inverted_binary_sensor.toml",
    include_str!("../blueprints/template/inverted_binary_sensor.toml"),
)];

/// Serves the blueprints shipped with tmplhub.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBlueprintSource;

impl BlueprintSource for BuiltinBlueprintSource {
    async fn load(&self, domain: &str, path: &str) -> Result<Option<Document>, TmplHubError> {
        let Some((_, _, content)) = BUILTIN
            .iter()
            .find(|(builtin_domain, builtin_path, _)| *builtin_domain == domain && *builtin_path == path)
        else {
            return Ok(None);
        };
        Ok(Some(decode(path, content)?))
    }

    async fn list(&self, domain: &str) -> Result<Vec<String>, TmplHubError> {
        let mut paths: Vec<_> = BUILTIN
            .iter()
            .filter(|(builtin_domain, _, _)| *builtin_domain == domain)
            .map(|(_, path, _)| (*path).to_string())
            .collect();
        paths.sort();
        Ok(paths)
    }
}
