//! Error types for mapping configuration

use dm_core::Domain;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating mappings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("circular include detected: {path}")]
    CircularInclude { path: PathBuf },

    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("mapping {source_domain} -> {target} is not supported")]
    UnsupportedMapping { source_domain: String, target: Domain },

    #[error("source entity '{entity_id}' is not one of the available {domain} entities")]
    UnknownSource { entity_id: String, domain: Domain },

    #[error("duplicate config entry id '{entry_id}'")]
    DuplicateEntry { entry_id: String },
}
