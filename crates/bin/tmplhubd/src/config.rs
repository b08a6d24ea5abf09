//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `tmplhub.toml` in the working directory (or the file named by
//! `TMPLHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.
//!
//! ```toml
//! [logging]
//! filter = "tmplhubd=info,tmplhub_app=info"
//!
//! [blueprints]
//! dir = "blueprints"
//!
//! [runtime]
//! dynamic_refresh_secs = 30
//!
//! [states]
//! "binary_sensor.foo" = "on"
//!
//! [[template]]
//! name = "Inverted foo"
//! use_blueprint = { path = "inverted_binary_sensor.toml", input = { original_entity = "binary_sensor.foo" } }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tmplhub_app::runtime::RuntimeConfig;
use tmplhub_domain::document::Document;
use tmplhub_domain::entity::EntityState;
use tmplhub_domain::id::EntityId;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Where user blueprints live.
    pub blueprints: BlueprintsConfig,
    /// Template runtime tuning.
    pub runtime: RuntimeSection,
    /// Initial entity states, published before the integration starts.
    pub states: BTreeMap<String, String>,
    /// Entries of the `template` integration.
    pub template: Vec<serde_json::Value>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Blueprint directory configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BlueprintsConfig {
    /// Root directory; blueprints are read from `<dir>/<domain>/`.
    pub dir: PathBuf,
}

/// Runtime and state bus settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Recompute entities with dynamic references every N seconds.
    pub dynamic_refresh_secs: Option<u64>,
    /// Events kept for lagging state observers.
    pub bus_capacity: usize,
}

impl Config {
    /// Load configuration from `tmplhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("TMPLHUB_CONFIG").unwrap_or_else(|_| "tmplhub.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TMPLHUB_BLUEPRINT_DIR") {
            self.blueprints.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TMPLHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.bus_capacity == 0 {
            return Err(ConfigError::Validation("bus_capacity must be non-zero".to_string()));
        }
        if self.runtime.dynamic_refresh_secs == Some(0) {
            return Err(ConfigError::Validation(
                "dynamic_refresh_secs must be non-zero".to_string(),
            ));
        }
        if let Some(invalid) = self.states.keys().find(|key| EntityId::parse(key.as_str()).is_err()) {
            return Err(ConfigError::Validation(format!(
                "invalid entity id {invalid:?} in [states]"
            )));
        }
        Ok(())
    }

    /// Return the runtime settings.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            dynamic_refresh: self.runtime.dynamic_refresh_secs.map(Duration::from_secs),
        }
    }

    /// Return the seeded states. Invalid ids were rejected by validation.
    #[must_use]
    pub fn seed_states(&self) -> Vec<(EntityId, EntityState)> {
        self.states
            .iter()
            .filter_map(|(key, state)| {
                EntityId::parse(key.as_str())
                    .ok()
                    .map(|entity_id| (entity_id, EntityState::parse(state)))
            })
            .collect()
    }

    /// Return the `template` section as a document.
    #[must_use]
    pub fn template_entries(&self) -> Document {
        Document::Sequence(self.template.iter().cloned().map(Document::from).collect())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tmplhubd=info,tmplhub_app=info".to_string(),
        }
    }
}

impl Default for BlueprintsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("blueprints"),
        }
    }
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            dynamic_refresh_secs: None,
            bus_capacity: 256,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
