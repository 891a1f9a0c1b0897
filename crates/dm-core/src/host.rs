//! The host collaborators the mapper depends on
//!
//! The mapper never owns entity storage or service handling. It reads the
//! host's state registry, tracks changes through the host's subscription
//! service, publishes rendered proxy states through a state writer and
//! sends commands through a dispatcher. In-process implementations live in
//! `dm-state-store` and `dm-service-registry`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{Attributes, EntityId, EntityIdError, ServiceCall, ServiceError, State, StateChangedData};

/// Callback invoked synchronously for each change of a tracked entity
pub type StateChangeCallback = Arc<dyn Fn(&StateChangedData) + Send + Sync>;

/// Errors from the subscription service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("cannot track '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    #[error("state change tracking has been shut down")]
    Closed,
}

/// Errors from the state writer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("state '{state}' for {entity_id} is longer than {max} characters")]
    StateTooLong {
        entity_id: String,
        state: String,
        max: usize,
    },

    #[error("state writer has been shut down")]
    Closed,
}

/// Read access to current entity states
pub trait StateRegistry: Send + Sync {
    /// Current state of an entity, `None` if it does not exist
    fn get(&self, entity_id: &str) -> Option<State>;

    /// Ids of all entities currently known in a domain
    fn entity_ids(&self, domain: &str) -> Vec<String>;
}

/// Subscription service for per-entity state changes
pub trait StateChangeTracker: Send + Sync {
    /// Call `on_change` for every later change of `entity_id`
    ///
    /// Malformed ids are rejected. Delivery is synchronous with the write
    /// that caused the change.
    fn track_state_change(
        &self,
        entity_id: &str,
        on_change: StateChangeCallback,
    ) -> Result<Subscription, SubscriptionError>;
}

/// Where proxies publish their rendered state
pub trait StateWriter: Send + Sync {
    fn write_state(
        &self,
        entity_id: &EntityId,
        state: &str,
        attributes: Attributes,
    ) -> Result<(), WriteError>;

    fn remove_state(&self, entity_id: &EntityId) -> Result<(), WriteError>;
}

/// Dispatches service calls to whoever handles them
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Run a service call; with `blocking` set, returns once the handler finished
    async fn invoke(&self, call: ServiceCall) -> Result<(), ServiceError>;
}

/// Handle of a live state change subscription
///
/// The subscription is cancelled exactly once: by [`unsubscribe`](Self::unsubscribe)
/// or, failing that, when the handle is dropped.
pub struct Subscription {
    entity_id: String,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(entity_id: impl Into<String>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            entity_id: entity_id.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unsubscribe(mut self) {
        self.cancel_once();
    }

    fn cancel_once(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_once();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entity_id", &self.entity_id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Bundle of host collaborators handed to coordinators and proxies
#[derive(Clone)]
pub struct Host {
    pub states: Arc<dyn StateRegistry>,
    pub tracker: Arc<dyn StateChangeTracker>,
    pub writer: Arc<dyn StateWriter>,
    pub commands: Arc<dyn CommandDispatcher>,
}

impl Host {
    pub fn new(
        states: Arc<dyn StateRegistry>,
        tracker: Arc<dyn StateChangeTracker>,
        writer: Arc<dyn StateWriter>,
        commands: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            states,
            tracker,
            writer,
            commands,
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_subscription(counter: &Arc<AtomicUsize>) -> Subscription {
        let counter = counter.clone();
        Subscription::new("switch.pump", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_unsubscribe_cancels_once() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let sub = counting_subscription(&cancelled);
        assert_eq!(sub.entity_id(), "switch.pump");

        sub.unsubscribe();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels_live_subscription() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        {
            let _sub = counting_subscription(&cancelled);
        }
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_shows_activity() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let sub = counting_subscription(&cancelled);
        assert!(format!("{sub:?}").contains("active: true"));
    }
}
