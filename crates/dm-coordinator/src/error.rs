//! Coordinator and listener errors

use dm_core::SubscriptionError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The upstream entity is missing from the registry
    #[error("upstream entity '{entity_id}' is unavailable")]
    UpstreamUnavailable { entity_id: String },

    /// The host refused to track the upstream entity
    #[error("failed to subscribe to upstream changes: {0}")]
    SubscriptionFailure(#[from] SubscriptionError),
}

/// Failure reported by a listener during a notification pass
///
/// Never propagated: the pass logs it and moves on to the next listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerError {
    #[error("listener failed: {0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}
