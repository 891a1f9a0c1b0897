//! In-process entity state registry
//!
//! This crate provides the StateStore, the upstream side of the mapper when
//! it runs in-process: it keeps the current state of every entity, indexes
//! entity ids by domain, delivers per-entity change callbacks synchronously
//! with each write, and mirrors every change onto a broadcast channel for
//! asynchronous observers.

use dashmap::DashMap;
use dm_core::{
    Attributes, EntityId, State, StateChangeCallback, StateChangeTracker, StateChangedData,
    StateRegistry, StateWriter, Subscription, SubscriptionError, WriteError,
};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Maximum length of a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// Capacity of the broadcast change feed
const FEED_CAPACITY: usize = 1024;

/// Per-entity change callbacks, kept in subscription order
type Trackers = DashMap<String, IndexMap<u64, StateChangeCallback>>;

/// The state store holds every entity state of the host
///
/// Writes are visible to `get` before any change callback runs, so a
/// callback that re-reads the store always sees at least the state it was
/// notified about.
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// Synchronous change callbacks keyed by entity_id string
    trackers: Arc<Trackers>,
    next_subscription_id: AtomicU64,
    /// Feed of all changes for async observers
    feed: broadcast::Sender<StateChangedData>,
    closed: AtomicBool,
}

impl StateStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            trackers: Arc::new(DashMap::new()),
            next_subscription_id: AtomicU64::new(1),
            feed,
            closed: AtomicBool::new(false),
        }
    }

    /// Set the state of an entity and notify its trackers
    ///
    /// `last_changed` is only moved if the state value actually changed.
    #[instrument(skip(self, state, attributes), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes),
            None => State::new(entity_id.clone(), state, attributes),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        self.notify(StateChangedData {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });

        new_state
    }

    /// Remove an entity; trackers see a change with no new state
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s)?;

        trace!("Removing entity state");
        if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
            ids.retain(|id| id != &key);
        }

        self.notify(StateChangedData {
            entity_id: entity_id.clone(),
            old_state: Some(old_state.clone()),
            new_state: None,
        });

        Some(old_state)
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The state value alone, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Receive every later change, including removals
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.feed.subscribe()
    }

    /// Number of live change callbacks for an entity
    pub fn tracker_count(&self, entity_id: &str) -> usize {
        self.trackers.get(entity_id).map(|t| t.len()).unwrap_or(0)
    }

    /// Refuse new subscriptions and writes and drop all callbacks
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.trackers.clear();
        debug!("State store shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn notify(&self, change: StateChangedData) {
        // Clone the callbacks out so none runs while a map shard is locked
        let callbacks: Vec<StateChangeCallback> = self
            .trackers
            .get(&change.entity_id.to_string())
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();

        trace!(
            entity_id = %change.entity_id,
            callbacks = callbacks.len(),
            "Delivering state change"
        );
        for callback in callbacks {
            callback(&change);
        }

        // Ignore send errors - they just mean no active receivers
        let _ = self.feed.send(change);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegistry for StateStore {
    fn get(&self, entity_id: &str) -> Option<State> {
        StateStore::get(self, entity_id)
    }

    fn entity_ids(&self, domain: &str) -> Vec<String> {
        StateStore::entity_ids(self, domain)
    }
}

impl StateChangeTracker for StateStore {
    #[instrument(skip(self, on_change))]
    fn track_state_change(
        &self,
        entity_id: &str,
        on_change: StateChangeCallback,
    ) -> Result<Subscription, SubscriptionError> {
        let parsed: EntityId =
            entity_id
                .parse()
                .map_err(|source| SubscriptionError::InvalidEntityId {
                    entity_id: entity_id.to_string(),
                    source,
                })?;
        if self.is_closed() {
            return Err(SubscriptionError::Closed);
        }

        let key = parsed.to_string();
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.trackers
            .entry(key.clone())
            .or_default()
            .insert(id, on_change);
        debug!(subscription_id = id, "Tracking state changes");

        let trackers = Arc::clone(&self.trackers);
        Ok(Subscription::new(key.clone(), move || {
            trackers.remove_if_mut(&key, |_, callbacks| {
                callbacks.shift_remove(&id);
                callbacks.is_empty()
            });
            trace!(entity_id = %key, subscription_id = id, "Stopped tracking state changes");
        }))
    }
}

impl StateWriter for StateStore {
    fn write_state(
        &self,
        entity_id: &EntityId,
        state: &str,
        attributes: Attributes,
    ) -> Result<(), WriteError> {
        if self.is_closed() {
            return Err(WriteError::Closed);
        }
        if state.len() > MAX_STATE_LENGTH {
            return Err(WriteError::StateTooLong {
                entity_id: entity_id.to_string(),
                state: state.to_string(),
                max: MAX_STATE_LENGTH,
            });
        }
        self.set(entity_id.clone(), state, attributes);
        Ok(())
    }

    fn remove_state(&self, entity_id: &EntityId) -> Result<(), WriteError> {
        self.remove(entity_id);
        Ok(())
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;
