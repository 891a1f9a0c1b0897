//! Mapping entries and their validated, resolved form
//!
//! A [`MappingEntry`] is what gets persisted (or written in YAML): the data
//! chosen when the mapping was created plus an optional options override.
//! [`MappingEntry::resolve`] validates the effective data and produces the
//! immutable [`MappingConfig`] a coordinator is built from.

use dm_core::{Domain, EntityId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ConfigError, ConfigResult};

/// User-chosen mapping data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingData {
    /// Domain the proxy entity is published under
    pub target_domain: Domain,

    /// The upstream entity being proxied
    pub source_entity: EntityId,

    /// Defaults to the domain part of `source_entity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<Domain>,

    /// Display name override for the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Binary sensor device class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
}

impl MappingData {
    pub fn new(target_domain: Domain, source_entity: EntityId) -> Self {
        Self {
            target_domain,
            source_entity,
            source_domain: None,
            name: None,
            device_class: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }
}

/// A persisted mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Unique identifier (ULID)
    #[serde(default = "new_entry_id")]
    pub entry_id: String,

    /// Human-readable title; defaults to the source entity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub data: MappingData,

    /// Replaces `data` entirely when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<MappingData>,
}

pub(crate) fn new_entry_id() -> String {
    ulid::Ulid::new().to_string()
}

impl MappingEntry {
    pub fn new(data: MappingData) -> Self {
        Self {
            entry_id: new_entry_id(),
            title: None,
            data,
            options: None,
        }
    }

    /// The data in effect: options if set, else the original data
    pub fn effective(&self) -> &MappingData {
        self.options.as_ref().unwrap_or(&self.data)
    }

    pub fn title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.data.source_entity.to_string())
    }

    /// Validate the effective data and build the immutable configuration
    pub fn resolve(&self) -> ConfigResult<MappingConfig> {
        let data = self.effective();
        let entity_domain = data.source_entity.domain();

        let source_domain: Domain =
            entity_domain
                .parse()
                .map_err(|_| ConfigError::UnsupportedMapping {
                    source_domain: entity_domain.to_string(),
                    target: data.target_domain,
                })?;

        if let Some(declared) = data.source_domain {
            if declared != source_domain {
                return Err(ConfigError::InvalidValue {
                    key: "source_domain".to_string(),
                    reason: format!(
                        "declared {declared} but source entity {} is a {source_domain}",
                        data.source_entity
                    ),
                });
            }
        }

        if !Domain::is_supported_pair(source_domain, data.target_domain) {
            return Err(ConfigError::UnsupportedMapping {
                source_domain: source_domain.to_string(),
                target: data.target_domain,
            });
        }

        if data.device_class.is_some() && data.target_domain != Domain::BinarySensor {
            return Err(ConfigError::InvalidValue {
                key: "device_class".to_string(),
                reason: format!(
                    "only binary_sensor mappings take a device class, not {}",
                    data.target_domain
                ),
            });
        }

        trace!(
            entry_id = %self.entry_id,
            source = %data.source_entity,
            target = %data.target_domain,
            "Resolved mapping"
        );

        Ok(MappingConfig {
            entry_id: self.entry_id.clone(),
            title: self.title(),
            source_entity: data.source_entity.clone(),
            source_domain,
            target_domain: data.target_domain,
            name: data.name.clone(),
            device_class: data.device_class.clone(),
        })
    }
}

/// Immutable, validated configuration of one mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConfig {
    pub entry_id: String,
    pub title: String,
    pub source_entity: EntityId,
    pub source_domain: Domain,
    pub target_domain: Domain,
    pub name: Option<String>,
    pub device_class: Option<String>,
}
