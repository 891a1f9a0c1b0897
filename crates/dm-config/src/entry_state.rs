//! Mapping entry lifecycle
//!
//! ```text
//! NotLoaded → SetupInProgress → Loaded
//!                            ↘ SetupError
//!
//! Loaded/SetupError → UnloadInProgress → NotLoaded
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    SetupError,
    UnloadInProgress,
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: EntryState,
    pub to: EntryState,
    pub reason: &'static str,
}

impl EntryState {
    pub fn try_transition(self, to: EntryState) -> Result<EntryState, InvalidTransition> {
        use EntryState::*;

        let valid = matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded)
                | (SetupInProgress, SetupError)
                | (Loaded, UnloadInProgress)
                | (SetupError, UnloadInProgress)
                | (UnloadInProgress, NotLoaded)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: Self::transition_error_reason(self, to),
            })
        }
    }

    pub fn can_transition_to(self, to: EntryState) -> bool {
        self.try_transition(to).is_ok()
    }

    /// Whether proxies of the entry are live
    pub fn is_loaded(self) -> bool {
        self == EntryState::Loaded
    }

    fn transition_error_reason(from: EntryState, to: EntryState) -> &'static str {
        use EntryState::*;

        match (from, to) {
            (SetupInProgress, NotLoaded) => "setup must complete before unloading",
            (UnloadInProgress, Loaded) => "unload in progress, cannot go back to Loaded",
            (NotLoaded, Loaded) | (NotLoaded, SetupError) => "must go through SetupInProgress",
            (Loaded, NotLoaded) => "must go through UnloadInProgress",
            (Loaded, SetupInProgress) => "already loaded, unload first",
            (SetupError, SetupInProgress) => "unload the failed entry before retrying",
            _ => "invalid state transition",
        }
    }
}
