//! Proxy errors

use dm_core::{Domain, EntityIdError, ServiceError, WriteError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The command reached the dispatcher but failed there
    #[error("command dispatch failed: {0}")]
    Dispatch(#[from] ServiceError),

    #[error("failed to publish proxy state: {0}")]
    Write(#[from] WriteError),

    #[error("invalid proxy entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("no proxy variant for target domain {0}")]
    UnsupportedTarget(Domain),

    #[error("unsupported hvac mode '{0}'")]
    UnsupportedHvacMode(String),

    #[error("unsupported preset mode '{0}'")]
    UnsupportedPresetMode(String),
}
