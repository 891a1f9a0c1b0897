//! What every proxy variant shares: identity, naming, device info and
//! command issuance through its coordinator

use std::sync::{Arc, Mutex};

use dm_coordinator::{ListenerId, StateTrackingCoordinator};
use dm_core::attrs::ATTR_FRIENDLY_NAME;
use dm_core::{Attributes, Domain, EntityId, Host, ServiceCall, Snapshot, INTEGRATION_DOMAIN};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::ProxyError;

pub const ATTR_SOURCE_ENTITY: &str = "source_entity";
pub const ATTR_ATTRIBUTE: &str = "attribute";

pub const MANUFACTURER: &str = "DomainMapper";
pub const MODEL: &str = "ProxyEntity";

/// Unique id and entity id of the proxy republishing `source_entity`
/// under `target`
pub fn proxy_identity(
    source_entity: &EntityId,
    target: Domain,
) -> Result<(String, EntityId), ProxyError> {
    let unique_id = format!("{INTEGRATION_DOMAIN}_{}", source_entity.object_id());
    let entity_id = EntityId::new(target.as_str(), unique_id.clone())?;
    Ok((unique_id, entity_id))
}

/// Device the proxy is grouped under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Rendered proxy state, ready to be published
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub state: String,
    pub attributes: Attributes,
}

impl Rendered {
    pub(crate) fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Attributes::new(),
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub(crate) fn set_opt(&mut self, key: &str, value: Option<Value>) {
        if let Some(value) = value {
            self.attributes.insert(key.to_string(), value);
        }
    }
}

/// A proxy's link to its coordinator and the host
pub struct ProxyContext {
    coordinator: Arc<StateTrackingCoordinator>,
    host: Host,
    unique_id: String,
    entity_id: EntityId,
    /// Set while attached to the coordinator
    pub(crate) listener: Mutex<Option<ListenerId>>,
}

impl ProxyContext {
    pub fn new(coordinator: Arc<StateTrackingCoordinator>) -> Result<Self, ProxyError> {
        let (unique_id, entity_id) =
            proxy_identity(coordinator.source_entity(), coordinator.target_domain())?;
        let host = coordinator.host().clone();

        Ok(Self {
            coordinator,
            host,
            unique_id,
            entity_id,
            listener: Mutex::new(None),
        })
    }

    pub fn coordinator(&self) -> &Arc<StateTrackingCoordinator> {
        &self.coordinator
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// `domain_mapper_<source object id>`
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// `<target domain>.<unique id>`
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.coordinator.current_snapshot()
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Override, else the source's friendly name, else the unique id
    pub fn name(&self) -> String {
        if let Some(name) = self.coordinator.display_name_override() {
            return name.to_string();
        }
        self.snapshot()
            .and_then(|s| s.attribute_str(ATTR_FRIENDLY_NAME).map(str::to_string))
            .unwrap_or_else(|| self.unique_id.clone())
    }

    pub fn device_info(&self) -> DeviceInfo {
        let source_domain = self.coordinator.source_domain();
        DeviceInfo {
            identifiers: vec![(
                INTEGRATION_DOMAIN.to_string(),
                source_domain.as_str().to_string(),
            )],
            name: source_domain.title_case(),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
        }
    }

    /// `source_entity` plus the full source attribute map
    pub fn extra_attributes(&self, snapshot: Option<&Snapshot>) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            ATTR_SOURCE_ENTITY.to_string(),
            Value::String(self.coordinator.source_entity().to_string()),
        );
        if let Some(snapshot) = snapshot {
            let source: serde_json::Map<String, Value> = snapshot
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            attributes.insert(ATTR_ATTRIBUTE.to_string(), Value::Object(source));
        }
        attributes
    }

    /// Send a blocking command to the source entity, then refresh
    ///
    /// The refresh runs even when dispatch fails; the failure is returned
    /// afterwards.
    #[instrument(skip(self, data), fields(entity_id = %self.entity_id))]
    pub(crate) async fn command(
        &self,
        service: &str,
        data: Vec<(&str, Value)>,
    ) -> Result<(), ProxyError> {
        let call = data.into_iter().fold(
            ServiceCall::for_entity(service, self.coordinator.source_entity()),
            |call, (key, value)| call.with_data(key, value),
        );
        debug!(service = %call.service_id(), "Issuing command");

        let result = self.host.commands.invoke(call).await;
        if let Err(err) = &result {
            warn!(error = %err, "Command failed");
        }

        self.coordinator.request_refresh();
        result.map_err(ProxyError::from)
    }
}

impl std::fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyContext")
            .field("entity_id", &self.entity_id)
            .field("source_entity", self.coordinator.source_entity())
            .finish_non_exhaustive()
    }
}
