//! The two-step mapping flow
//!
//! Step one picks the target domain, step two picks a source entity among
//! the registry entities of the domain that target expects. Started from an
//! existing entry, the same steps produce an options override instead of a
//! new entry.

use dm_core::{Domain, EntityId, StateRegistry};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::mapping::{MappingData, MappingEntry};

/// First step: choose the target domain
#[derive(Debug, Clone)]
pub struct MappingFlow {
    existing: Option<MappingEntry>,
}

impl MappingFlow {
    /// Flow creating a new entry
    pub fn user() -> Self {
        Self { existing: None }
    }

    /// Flow editing the options of an existing entry
    pub fn options(entry: MappingEntry) -> Self {
        Self {
            existing: Some(entry),
        }
    }

    pub fn step_id(&self) -> &'static str {
        if self.existing.is_some() {
            "init"
        } else {
            "user"
        }
    }

    pub fn target_choices(&self) -> Vec<Domain> {
        Domain::targets().collect()
    }

    /// Preselected target: the one currently in effect for an options flow
    pub fn default_target(&self) -> Option<Domain> {
        self.existing.as_ref().map(|e| e.effective().target_domain)
    }

    pub fn select_target(self, target: Domain) -> ConfigResult<SourceStep> {
        let source_domain =
            target
                .expected_source()
                .ok_or_else(|| ConfigError::UnsupportedMapping {
                    source_domain: "<none>".to_string(),
                    target,
                })?;

        debug!(%target, %source_domain, "Selected target domain");
        Ok(SourceStep {
            existing: self.existing,
            target,
            source_domain,
        })
    }
}

/// Second step: choose the source entity
#[derive(Debug, Clone)]
pub struct SourceStep {
    existing: Option<MappingEntry>,
    target: Domain,
    source_domain: Domain,
}

impl SourceStep {
    pub fn step_id(&self) -> &'static str {
        "select_source"
    }

    pub fn target(&self) -> Domain {
        self.target
    }

    pub fn source_domain(&self) -> Domain {
        self.source_domain
    }

    /// Registry entities of the expected source domain, sorted
    pub fn candidates(&self, registry: &dyn StateRegistry) -> Vec<String> {
        let mut ids = registry.entity_ids(self.source_domain.as_str());
        ids.sort();
        debug!(domain = %self.source_domain, candidates = ?ids, "Filtered entities");
        ids
    }

    /// Preselected source for an options flow, if it still fits the target
    pub fn default_source(&self) -> Option<&EntityId> {
        self.existing
            .as_ref()
            .map(|e| &e.effective().source_entity)
            .filter(|id| id.domain() == self.source_domain.as_str())
    }

    /// Finish the flow
    ///
    /// Returns a new entry for a user flow, or the existing entry with its
    /// options replaced for an options flow.
    pub fn select_source(
        self,
        registry: &dyn StateRegistry,
        source_entity: &str,
    ) -> ConfigResult<MappingEntry> {
        let unknown = || ConfigError::UnknownSource {
            entity_id: source_entity.to_string(),
            domain: self.source_domain,
        };

        if !self.candidates(registry).iter().any(|id| id == source_entity) {
            return Err(unknown());
        }
        let source: EntityId = source_entity.parse().map_err(|_| unknown())?;
        let data = MappingData::new(self.target, source);

        let entry = match self.existing {
            Some(mut entry) => {
                entry.options = Some(data);
                entry
            }
            None => {
                let mut entry = MappingEntry::new(data);
                entry.title = Some(source_entity.to_string());
                entry
            }
        };

        // Catch anything the choices above did not rule out
        entry.resolve()?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_state_store::StateStore;
    use std::collections::HashMap;

    fn store() -> StateStore {
        let store = StateStore::new();
        for id in ["water_heater.boiler", "water_heater.annex", "switch.pump", "light.hall"] {
            store.set(id.parse().unwrap(), "off", HashMap::new());
        }
        store
    }

    #[test]
    fn test_user_flow_creates_entry() {
        let store = store();
        let flow = MappingFlow::user();
        assert_eq!(flow.step_id(), "user");
        assert_eq!(flow.target_choices(), vec![Domain::Climate, Domain::BinarySensor]);
        assert_eq!(flow.default_target(), None);

        let step = flow.select_target(Domain::Climate).unwrap();
        assert_eq!(step.source_domain(), Domain::WaterHeater);
        assert_eq!(
            step.candidates(&store),
            vec!["water_heater.annex", "water_heater.boiler"]
        );

        let entry = step.select_source(&store, "water_heater.boiler").unwrap();
        assert_eq!(entry.title(), "water_heater.boiler");
        assert_eq!(entry.data.target_domain, Domain::Climate);
        assert!(entry.options.is_none());
    }

    #[test]
    fn test_source_outside_candidates_is_rejected() {
        let store = store();
        let step = MappingFlow::user().select_target(Domain::BinarySensor).unwrap();

        assert!(matches!(
            step.clone().select_source(&store, "light.hall"),
            Err(ConfigError::UnknownSource { domain: Domain::Switch, .. })
        ));
        assert!(matches!(
            step.select_source(&store, "switch.missing"),
            Err(ConfigError::UnknownSource { .. })
        ));
    }

    #[test]
    fn test_source_domain_is_not_a_target() {
        assert!(matches!(
            MappingFlow::user().select_target(Domain::Switch),
            Err(ConfigError::UnsupportedMapping { .. })
        ));
    }

    #[test]
    fn test_options_flow_overrides_existing_entry() {
        let store = store();
        let original = MappingEntry::new(MappingData::new(
            Domain::Climate,
            "water_heater.boiler".parse().unwrap(),
        ));

        let flow = MappingFlow::options(original.clone());
        assert_eq!(flow.step_id(), "init");
        assert_eq!(flow.default_target(), Some(Domain::Climate));

        let step = flow.select_target(Domain::Climate).unwrap();
        assert_eq!(
            step.default_source().map(ToString::to_string).as_deref(),
            Some("water_heater.boiler")
        );

        let updated = step.select_source(&store, "water_heater.annex").unwrap();
        assert_eq!(updated.entry_id, original.entry_id);
        assert_eq!(updated.data, original.data);
        assert_eq!(
            updated.resolve().unwrap().source_entity.to_string(),
            "water_heater.annex"
        );
    }

    #[test]
    fn test_options_flow_default_source_dropped_when_target_changes() {
        let original = MappingEntry::new(MappingData::new(
            Domain::Climate,
            "water_heater.boiler".parse().unwrap(),
        ));
        let step = MappingFlow::options(original)
            .select_target(Domain::BinarySensor)
            .unwrap();
        assert!(step.default_source().is_none());
    }
}
