//! Blueprints stored as files under `<root>/<domain>/`.

use std::path::{Component, Path, PathBuf};

use tmplhub_app::ports::BlueprintSource;
use tmplhub_domain::document::Document;
use tmplhub_domain::error::TmplHubError;

use crate::decode::decode;
use crate::error::SourceError;

const EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Reads blueprint files from a directory tree.
///
/// Paths are relative to the domain directory and use `/` separators, e.g.
/// `inverted_binary_sensor.toml` or `lights/motion.json`.
#[derive(Debug, Clone)]
pub struct FsBlueprintSource {
    root: PathBuf,
}

impl FsBlueprintSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, domain: &str, path: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(SourceError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(domain).join(relative))
    }

    async fn read(&self, domain: &str, path: &str) -> Result<Option<Document>, SourceError> {
        let file = self.resolve(domain, path)?;
        let text = match tokio::fs::read_to_string(&file).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %file.display(), "blueprint file not found");
                return Ok(None);
            }
            Err(source) => return Err(SourceError::Io { path: file, source }),
        };
        decode(path, &text).map(Some)
    }

    async fn walk(&self, domain: &str) -> Result<Vec<String>, SourceError> {
        let base = self.root.join(domain);
        let mut found = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(SourceError::Io { path: dir, source }),
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(source) => return Err(SourceError::Io { path: dir, source }),
                };
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.clone(),
                        source,
                    })?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if has_blueprint_extension(&path)
                    && let Ok(relative) = path.strip_prefix(&base)
                {
                    found.push(to_slash_path(relative));
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

fn has_blueprint_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

fn to_slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl BlueprintSource for FsBlueprintSource {
    async fn load(&self, domain: &str, path: &str) -> Result<Option<Document>, TmplHubError> {
        Ok(self.read(domain, path).await?)
    }

    async fn list(&self, domain: &str) -> Result<Vec<String>, TmplHubError> {
        Ok(self.walk(domain).await?)
    }
}
