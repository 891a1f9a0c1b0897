//! Owner of every mapping entry and its live parts

use std::sync::{Arc, PoisonError, RwLock};

use dm_config::{ConfigError, EntryState, MappingData, MappingEntry};
use dm_coordinator::StateTrackingCoordinator;
use dm_core::{EntityId, Host};
use dm_proxy::{proxy_identity, ProxyEntity};
use indexmap::IndexMap;
use tracing::{debug, info, instrument, warn};

use crate::error::{SetupError, SetupResult};
use crate::setup::{setup_mapping, unload_mapping, LoadedMapping, SetupOptions};

struct EntrySlot {
    entry: MappingEntry,
    state: EntryState,
    reason: Option<String>,
    loaded: Option<LoadedMapping>,
}

/// The domain mapper integration
///
/// Entries are kept in insertion order. Proxies hold their coordinator
/// directly; nothing looks them up by entry id.
pub struct DomainMapper {
    host: Host,
    options: SetupOptions,
    entries: RwLock<IndexMap<String, EntrySlot>>,
}

impl DomainMapper {
    pub fn new(host: Host) -> Self {
        Self::with_options(host, SetupOptions::default())
    }

    pub fn with_options(host: Host, options: SetupOptions) -> Self {
        Self {
            host,
            options,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn options(&self) -> SetupOptions {
        self.options
    }

    /// Add an entry without setting it up
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub fn add_entry(&self, entry: MappingEntry) -> SetupResult<String> {
        // reject invalid entries up front
        entry.resolve()?;

        let mut entries = self.write();
        if entries.contains_key(&entry.entry_id) {
            return Err(ConfigError::DuplicateEntry {
                entry_id: entry.entry_id,
            }
            .into());
        }

        let entry_id = entry.entry_id.clone();
        info!(title = %entry.title(), "Added config entry");
        entries.insert(
            entry_id.clone(),
            EntrySlot {
                entry,
                state: EntryState::NotLoaded,
                reason: None,
                loaded: None,
            },
        );
        Ok(entry_id)
    }

    /// Set up one entry
    #[instrument(skip(self))]
    pub fn setup(&self, entry_id: &str) -> SetupResult<()> {
        let entry = {
            let mut entries = self.write();
            let slot = entries
                .get_mut(entry_id)
                .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;
            slot.state = slot.state.try_transition(EntryState::SetupInProgress)?;
            slot.reason = None;
            slot.entry.clone()
        };

        // No lock held while subscribing and publishing
        let result = entry
            .resolve()
            .map_err(SetupError::from)
            .and_then(|config| setup_mapping(config, self.host.clone(), self.options));

        let mut entries = self.write();
        let Some(slot) = entries.get_mut(entry_id) else {
            if let Ok(loaded) = result {
                unload_mapping(loaded);
            }
            return Err(SetupError::EntryNotFound(entry_id.to_string()));
        };

        match result {
            Ok(loaded) => {
                slot.state = slot.state.try_transition(EntryState::Loaded)?;
                slot.loaded = Some(loaded);
                info!(title = %slot.entry.title(), "Setup completed");
                Ok(())
            }
            Err(err) => {
                slot.state = slot.state.try_transition(EntryState::SetupError)?;
                slot.reason = Some(err.to_string());
                warn!(error = %err, "Setup failed");
                Err(err)
            }
        }
    }

    /// Set up every entry that is not loaded, in insertion order
    pub fn setup_all(&self) -> Vec<(String, SetupResult<()>)> {
        let pending: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, slot)| slot.state == EntryState::NotLoaded)
            .map(|(id, _)| id.clone())
            .collect();

        pending
            .into_iter()
            .map(|id| {
                let result = self.setup(&id);
                (id, result)
            })
            .collect()
    }

    /// Unload one entry, back to `NotLoaded`
    #[instrument(skip(self))]
    pub fn unload(&self, entry_id: &str) -> SetupResult<()> {
        let loaded = {
            let mut entries = self.write();
            let slot = entries
                .get_mut(entry_id)
                .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;
            slot.state = slot.state.try_transition(EntryState::UnloadInProgress)?;
            slot.loaded.take()
        };

        if let Some(loaded) = loaded {
            unload_mapping(loaded);
        }

        let mut entries = self.write();
        if let Some(slot) = entries.get_mut(entry_id) {
            slot.state = slot.state.try_transition(EntryState::NotLoaded)?;
            slot.reason = None;
        }
        info!("Unloaded entry");
        Ok(())
    }

    /// Unload every loaded or failed entry
    pub fn unload_all(&self) {
        let ids: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, slot)| slot.state.can_transition_to(EntryState::UnloadInProgress))
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            if let Err(err) = self.unload(&id) {
                warn!(entry_id = %id, error = %err, "Unload failed");
            }
        }
    }

    /// Unload if needed, then set up again
    pub fn reload(&self, entry_id: &str) -> SetupResult<()> {
        let state = self
            .entry_state(entry_id)
            .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;
        if state.can_transition_to(EntryState::UnloadInProgress) {
            self.unload(entry_id)?;
        }
        self.setup(entry_id)
    }

    /// Replace an entry's options and reload it with them
    #[instrument(skip(self, options))]
    pub fn update_options(&self, entry_id: &str, options: MappingData) -> SetupResult<()> {
        {
            let mut entries = self.write();
            let slot = entries
                .get_mut(entry_id)
                .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;

            let mut candidate = slot.entry.clone();
            candidate.options = Some(options);
            candidate.resolve()?;
            slot.entry = candidate;
            debug!("Options updated");
        }
        self.reload(entry_id)
    }

    /// Unload and forget an entry
    pub fn remove_entry(&self, entry_id: &str) -> SetupResult<MappingEntry> {
        let state = self
            .entry_state(entry_id)
            .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;
        if state.can_transition_to(EntryState::UnloadInProgress) {
            self.unload(entry_id)?;
        }

        let slot = self
            .write()
            .shift_remove(entry_id)
            .ok_or_else(|| SetupError::EntryNotFound(entry_id.to_string()))?;
        info!(title = %slot.entry.title(), "Removed config entry");
        Ok(slot.entry)
    }

    pub fn entry(&self, entry_id: &str) -> Option<MappingEntry> {
        self.read().get(entry_id).map(|slot| slot.entry.clone())
    }

    pub fn entry_state(&self, entry_id: &str) -> Option<EntryState> {
        self.read().get(entry_id).map(|slot| slot.state)
    }

    /// Why the last setup failed, if it did
    pub fn setup_error(&self, entry_id: &str) -> Option<String> {
        self.read().get(entry_id).and_then(|slot| slot.reason.clone())
    }

    pub fn proxy(&self, entry_id: &str) -> Option<Arc<ProxyEntity>> {
        self.read()
            .get(entry_id)
            .and_then(|slot| slot.loaded.as_ref())
            .map(|loaded| loaded.proxy.clone())
    }

    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<StateTrackingCoordinator>> {
        self.read()
            .get(entry_id)
            .and_then(|slot| slot.loaded.as_ref())
            .map(|loaded| loaded.coordinator.clone())
    }

    /// All live proxies, in entry order
    pub fn proxies(&self) -> Vec<Arc<ProxyEntity>> {
        self.read()
            .values()
            .filter_map(|slot| slot.loaded.as_ref().map(|l| l.proxy.clone()))
            .collect()
    }

    /// Entity ids the entries' proxies publish under, loaded or not
    pub fn proxy_entity_ids(&self) -> Vec<EntityId> {
        self.read()
            .values()
            .filter_map(|slot| slot.entry.resolve().ok())
            .filter_map(|config| proxy_identity(&config.source_entity, config.target_domain).ok())
            .map(|(_, entity_id)| entity_id)
            .collect()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, EntrySlot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, EntrySlot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DomainMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainMapper")
            .field("entries", &self.entry_ids())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
