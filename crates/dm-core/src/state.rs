//! Entity state as held by the registry, and the snapshot the coordinator caches

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::states::{STATE_ON, STATE_UNAVAILABLE};
use crate::EntityId;

/// Named attributes of an entity state
pub type Attributes = HashMap<String, serde_json::Value>;

/// The state of an entity in the host registry
///
/// Besides the state string and attributes, the registry keeps when the
/// state string last changed and when the entity was last written at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value (e.g. "gas", "on", "off", "unavailable")
    pub state: String,

    #[serde(default)]
    pub attributes: Attributes,

    /// Moves only when `state` differs from the previous value
    pub last_changed: DateTime<Utc>,

    /// Moves on every write
    pub last_updated: DateTime<Utc>,
}

impl State {
    pub fn new(entity_id: EntityId, state: impl Into<String>, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Next version of this state, keeping `last_changed` if the value is unchanged
    pub fn with_update(&self, new_state: impl Into<String>, new_attributes: Attributes) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state == new_state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

/// Immutable observed state of an upstream entity at one point in time
///
/// This is what a coordinator caches and what proxies render from. The
/// "unknown" state (entity not resolved) is represented by the absence of
/// a snapshot, never by a special status value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Opaque state tag, e.g. "on", "off", "gas", "unavailable"
    pub status: String,

    #[serde(default)]
    pub attributes: Attributes,
}

impl Snapshot {
    pub fn new(status: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            status: status.into(),
            attributes,
        }
    }

    pub fn is_on(&self) -> bool {
        self.status == STATE_ON
    }

    /// Typed attribute lookup; `None` if missing or of another type
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

impl From<&State> for Snapshot {
    fn from(state: &State) -> Self {
        Self {
            status: state.state.clone(),
            attributes: state.attributes.clone(),
        }
    }
}

impl From<State> for Snapshot {
    fn from(state: State) -> Self {
        Self {
            status: state.state,
            attributes: state.attributes,
        }
    }
}
