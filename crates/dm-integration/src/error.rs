//! Setup errors

use dm_config::{ConfigError, InvalidTransition};
use dm_coordinator::CoordinatorError;
use dm_proxy::ProxyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("config entry not found: {0}")]
    EntryNotFound(String),
}

pub type SetupResult<T> = Result<T, SetupError>;
