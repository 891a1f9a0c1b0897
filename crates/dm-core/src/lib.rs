//! Core types for the domain mapper
//!
//! This crate provides the vocabulary shared by every other crate in the
//! workspace: validated entity ids, the fixed table of supported domain
//! pairs, the registry `State` and the coordinator's `Snapshot`, state
//! change notifications, service calls, and the traits through which the
//! core talks to its host (state registry, change tracker, state writer
//! and command dispatcher).

mod domain;
mod entity_id;
mod event;
mod host;
mod service_call;
mod state;

pub use domain::{Domain, DomainError, SUPPORTED_MAPPINGS};
pub use entity_id::{EntityId, EntityIdError};
pub use event::StateChangedData;
pub use host::{
    CommandDispatcher, Host, StateChangeCallback, StateChangeTracker, StateRegistry, StateWriter,
    Subscription, SubscriptionError, WriteError,
};
pub use service_call::{ServiceCall, ServiceError};
pub use state::{Attributes, Snapshot, State};

/// Integration domain, used as the unique-id prefix and device identifier
pub const INTEGRATION_DOMAIN: &str = "domain_mapper";

/// Well-known state values
pub mod states {
    pub const STATE_ON: &str = "on";
    pub const STATE_OFF: &str = "off";
    pub const STATE_UNAVAILABLE: &str = "unavailable";
    pub const STATE_UNKNOWN: &str = "unknown";
}

/// Well-known attribute and service-data keys
pub mod attrs {
    pub const ATTR_ENTITY_ID: &str = "entity_id";
    pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
    pub const ATTR_DEVICE_CLASS: &str = "device_class";
}
