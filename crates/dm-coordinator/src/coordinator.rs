//! The state-tracking coordinator

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use dm_config::MappingConfig;
use dm_core::{Domain, EntityId, Host, Snapshot, StateChangeCallback, StateChangedData, Subscription};
use tracing::{debug, instrument, warn};

use crate::error::{CoordinatorError, ListenerError};
use crate::listener::{ListenerId, Listeners, UpdateCallback};

/// Latest snapshot of one upstream entity, shared by the proxies of a mapping
///
/// The coordinator subscribes to the upstream entity when it is built and
/// replaces its snapshot on every pushed change, notifying listeners in
/// registration order. Refreshes re-read the registry on demand. A missing
/// entity is the unknown state (`None`), never an error for listeners.
pub struct StateTrackingCoordinator {
    config: MappingConfig,
    host: Host,
    data: RwLock<Option<Arc<Snapshot>>>,
    /// Bumped under the `data` write lock whenever a newer value is stored
    revision: AtomicU64,
    /// Set under the `data` write lock once the first refresh has run;
    /// no listener is notified before that
    refreshed: AtomicBool,
    listeners: Listeners,
    subscription: Mutex<Option<Subscription>>,
}

impl StateTrackingCoordinator {
    /// Build a coordinator and subscribe to its source entity
    ///
    /// The subscription is live before any read of the registry, so no
    /// change can slip between subscribing and the first refresh.
    #[instrument(skip_all, fields(entity_id = %config.source_entity, entry_id = %config.entry_id))]
    pub fn new(config: MappingConfig, host: Host) -> Result<Arc<Self>, CoordinatorError> {
        let coordinator = Arc::new(Self {
            config,
            host,
            data: RwLock::new(None),
            revision: AtomicU64::new(0),
            refreshed: AtomicBool::new(false),
            listeners: Listeners::new(),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&coordinator);
        let on_change: StateChangeCallback = Arc::new(move |change: &StateChangedData| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_upstream_change(change);
            }
        });

        let subscription = coordinator
            .host
            .tracker
            .track_state_change(&coordinator.config.source_entity.to_string(), on_change)
            .map_err(|err| {
                warn!(error = %err, "Subscription rejected");
                CoordinatorError::SubscriptionFailure(err)
            })?;

        *coordinator
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        debug!("Coordinator subscribed");
        Ok(coordinator)
    }

    /// Initial synchronous read of the upstream entity
    ///
    /// Listeners are not notified, and pushes arriving before this
    /// completes only update the cache. If a change was pushed while the
    /// read was in flight, the pushed snapshot is kept. Returns
    /// [`CoordinatorError::UpstreamUnavailable`] when the entity is missing;
    /// the coordinator stays usable with an unknown snapshot.
    #[instrument(skip(self), fields(entity_id = %self.config.source_entity))]
    pub fn first_refresh(&self) -> Result<(), CoordinatorError> {
        let revision = self.revision.load(Ordering::SeqCst);
        let fetched = self.fetch();

        let stored_known = {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            if self.revision.load(Ordering::SeqCst) == revision {
                *data = fetched;
                self.revision.fetch_add(1, Ordering::SeqCst);
            } else {
                debug!("Change pushed during first read, keeping pushed snapshot");
            }
            self.refreshed.store(true, Ordering::SeqCst);
            data.is_some()
        };

        if stored_known {
            debug!("First refresh complete");
            Ok(())
        } else {
            Err(CoordinatorError::UpstreamUnavailable {
                entity_id: self.config.source_entity.to_string(),
            })
        }
    }

    /// Re-read the upstream entity and notify every listener
    ///
    /// One read and one notification pass per call, even when the snapshot
    /// did not change. Before the first refresh only the cache is updated.
    #[instrument(skip(self), fields(entity_id = %self.config.source_entity))]
    pub fn request_refresh(&self) {
        let fetched = self.fetch();
        if self.store(fetched) {
            self.notify_listeners();
        }
    }

    /// Handle a pushed change of the upstream entity
    ///
    /// A change without a new state means the entity was removed, which
    /// makes the snapshot unknown. Changes of other entities are ignored.
    pub fn on_upstream_change(&self, change: &StateChangedData) {
        if change.entity_id != self.config.source_entity {
            debug!(
                expected = %self.config.source_entity,
                got = %change.entity_id,
                "Ignoring change of another entity"
            );
            return;
        }

        let snapshot = change.new_snapshot().map(Arc::new);
        debug!(
            entity_id = %change.entity_id,
            status = snapshot.as_ref().map(|s| s.status.as_str()).unwrap_or("<unknown>"),
            "Upstream changed"
        );
        if self.store(snapshot) {
            self.notify_listeners();
        } else {
            debug!("First refresh pending, listeners not notified");
        }
    }

    /// Register a re-render callback
    ///
    /// Registrations are not deduplicated: adding the same callback twice
    /// yields two ids and two invocations per notification.
    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.add_listener_arc(Arc::new(callback))
    }

    pub fn add_listener_arc(&self, callback: UpdateCallback) -> ListenerId {
        let id = self.listeners.add(callback);
        debug!(entity_id = %self.config.source_entity, %id, "Listener added");
        id
    }

    /// Unregister a callback; later notifications, including the rest of
    /// a pass already running, skip it
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(id);
        if removed {
            debug!(entity_id = %self.config.source_entity, %id, "Listener removed");
        }
        removed
    }

    /// Cancel the upstream subscription; later calls do nothing
    #[instrument(skip(self), fields(entity_id = %self.config.source_entity))]
    pub fn teardown(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            debug!("Coordinator torn down");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Current snapshot, `None` while the upstream entity is unknown
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn source_domain(&self) -> Domain {
        self.config.source_domain
    }

    pub fn target_domain(&self) -> Domain {
        self.config.target_domain
    }

    pub fn source_entity(&self) -> &EntityId {
        &self.config.source_entity
    }

    pub fn display_name_override(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Registry read, done without holding any coordinator lock
    fn fetch(&self) -> Option<Arc<Snapshot>> {
        let state = self.host.states.get(&self.config.source_entity.to_string());
        if state.is_none() {
            warn!(entity_id = %self.config.source_entity, "Upstream entity unavailable");
        }
        state.map(|s| Arc::new(Snapshot::from(s)))
    }

    /// Replace the cached snapshot; returns whether listeners may be notified
    fn store(&self, snapshot: Option<Arc<Snapshot>>) -> bool {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *data = snapshot;
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.refreshed.load(Ordering::SeqCst)
    }

    fn notify_listeners(&self) {
        let entity_id = self.config.source_entity.to_string();
        let invoked = self.listeners.notify_all(&entity_id);
        debug!(entity_id, invoked, "Notified listeners");
    }
}

impl std::fmt::Debug for StateTrackingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTrackingCoordinator")
            .field("entry_id", &self.config.entry_id)
            .field("source_entity", &self.config.source_entity)
            .field("target_domain", &self.config.target_domain)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
