//! Entity domains known to the mapper and the table of supported pairs
//!
//! A mapping always republishes a source domain under exactly one target
//! domain. The table is static; adding a pair means adding a proxy variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error for domain names outside the supported set
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unsupported domain '{0}'")]
    Unsupported(String),
}

/// An entity domain taking part in a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    WaterHeater,
    Climate,
    Switch,
    BinarySensor,
}

/// Supported `(source, target)` pairs
pub static SUPPORTED_MAPPINGS: &[(Domain, Domain)] = &[
    (Domain::WaterHeater, Domain::Climate),
    (Domain::Switch, Domain::BinarySensor),
];

impl Domain {
    /// The domain's wire name (`water_heater`, `binary_sensor`, ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::WaterHeater => "water_heater",
            Domain::Climate => "climate",
            Domain::Switch => "switch",
            Domain::BinarySensor => "binary_sensor",
        }
    }

    /// Human readable form: `water_heater` becomes `Water Heater`
    pub fn title_case(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The target domain this domain is republished as, if it is a source
    pub fn target_for(self) -> Option<Domain> {
        SUPPORTED_MAPPINGS
            .iter()
            .find(|(source, _)| *source == self)
            .map(|(_, target)| *target)
    }

    /// The source domain expected behind this target domain
    pub fn expected_source(self) -> Option<Domain> {
        SUPPORTED_MAPPINGS
            .iter()
            .find(|(_, target)| *target == self)
            .map(|(source, _)| *source)
    }

    /// All domains that can be chosen as a mapping target
    pub fn targets() -> impl Iterator<Item = Domain> {
        SUPPORTED_MAPPINGS.iter().map(|(_, target)| *target)
    }

    /// Whether `source → target` is one of the supported pairs
    pub fn is_supported_pair(source: Domain, target: Domain) -> bool {
        SUPPORTED_MAPPINGS.contains(&(source, target))
    }
}

impl FromStr for Domain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "water_heater" => Ok(Domain::WaterHeater),
            "climate" => Ok(Domain::Climate),
            "switch" => Ok(Domain::Switch),
            "binary_sensor" => Ok(Domain::BinarySensor),
            other => Err(DomainError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
