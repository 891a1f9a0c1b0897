//! Entity ID type: a `domain.object_id` address

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for malformed entity ids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity id '{0}' must be of the form <domain>.<object_id>")]
    InvalidFormat(String),

    #[error("entity id '{0}' has an empty domain or object id")]
    EmptyPart(String),

    #[error("entity id '{0}' may only contain lowercase letters, digits and inner underscores")]
    InvalidChars(String),
}

/// Address of an entity in the host, e.g. `water_heater.boiler`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Build an entity id from its two parts, validating both
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();
        let full = format!("{domain}.{object_id}");

        if domain.is_empty() || object_id.is_empty() {
            return Err(EntityIdError::EmptyPart(full));
        }
        if !is_slug(&domain) || domain.contains("__") || !is_slug(&object_id) {
            return Err(EntityIdError::InvalidChars(full));
        }

        Ok(Self { domain, object_id })
    }

    /// The domain part (`water_heater` in `water_heater.boiler`)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The object id part (`boiler` in `water_heater.boiler`)
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Lowercase alphanumerics and underscores, not starting or ending with `_`
fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}
