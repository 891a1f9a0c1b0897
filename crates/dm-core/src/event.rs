//! State change notification payload

use serde::{Deserialize, Serialize};

use crate::{EntityId, Snapshot, State};

/// Data carried by a state change notification
///
/// `old_state` is `None` when the entity just appeared, `new_state` is
/// `None` when it was removed from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl StateChangedData {
    /// The snapshot to cache after this change, `None` meaning unknown
    pub fn new_snapshot(&self) -> Option<Snapshot> {
        self.new_state.as_ref().map(Snapshot::from)
    }

    pub fn is_removal(&self) -> bool {
        self.new_state.is_none()
    }
}
