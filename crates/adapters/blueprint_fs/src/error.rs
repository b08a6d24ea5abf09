//! Source-specific error type wrapping IO and decoder errors.

use std::path::PathBuf;

use tmplhub_domain::error::TmplHubError;

/// Errors originating from a blueprint source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading a file or directory failed.
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode TOML blueprint {path}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to decode JSON blueprint {path}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Only `.toml` and `.json` blueprints are supported.
    #[error("unsupported blueprint format {0}")]
    UnsupportedFormat(String),

    /// The path is absolute or escapes the domain directory.
    #[error("invalid blueprint path {0}")]
    InvalidPath(String),
}

impl From<SourceError> for TmplHubError {
    fn from(err: SourceError) -> Self {
        Self::Source(Box::new(err))
    }
}
