//! Coordinator settings.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Log verbosity is not configured here; it comes from
//! `RUST_LOG` (see [`setup_tracing`](crate::lifecycle::setup_tracing)).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid coordinator configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Workload type treated as a resource adapter. Resource adapters start
    /// before every other workload in an episode.
    pub resource_adapter_type: String,
    /// Capacity of the event bus; slow subscribers lag beyond this.
    pub event_capacity: usize,
    /// How long shutdown waits for workloads to finish uninstalling.
    pub shutdown_grace_ms: u64,
    /// Root of the per-config artifact cache directories.
    pub cache_root: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            resource_adapter_type: "rar".to_string(),
            event_capacity: 256,
            shutdown_grace_ms: 5_000,
            cache_root: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoordinatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_applied() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            resource_adapter_type = "connector"
            event_capacity = 16
            cache_root = "/var/cache/apps"
            "#,
        )
        .unwrap();
        assert_eq!(config.resource_adapter_type, "connector");
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.shutdown_grace_ms, 5_000);
        assert_eq!(config.cache_root, Some(PathBuf::from("/var/cache/apps")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoordinatorConfig::from_toml_str("event_capacty = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");
        std::fs::write(&path, "shutdown_grace_ms = 250\n").unwrap();
        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));

        let missing = CoordinatorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
