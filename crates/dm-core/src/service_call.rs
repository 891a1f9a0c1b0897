//! Service calls: the commands proxies send to their underlying entity

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::attrs::ATTR_ENTITY_ID;
use crate::EntityId;

/// Errors returned by a command dispatcher
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// A call to `<domain>.<service>` with its service data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain of the service (the underlying entity's domain)
    pub domain: String,

    /// Service name, e.g. "turn_on" or "set_temperature"
    pub service: String,

    /// Service data; always an object
    pub data: Value,

    /// Wait for the handler to finish before returning
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

fn default_blocking() -> bool {
    true
}

impl ServiceCall {
    /// A blocking call targeting a single entity
    pub fn for_entity(service: impl Into<String>, target: &EntityId) -> Self {
        let mut data = Map::new();
        data.insert(ATTR_ENTITY_ID.to_string(), Value::String(target.to_string()));
        Self {
            domain: target.domain().to_string(),
            service: service.into(),
            data: Value::Object(data),
            blocking: true,
        }
    }

    /// Add one field of service data
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.data {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Full service identifier (`domain.service`)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Typed lookup in the service data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Targeted entity ids, accepting a single string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.data.get(ATTR_ENTITY_ID) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_targets_entity_domain() {
        let boiler: EntityId = "water_heater.boiler".parse().unwrap();
        let call = ServiceCall::for_entity("set_temperature", &boiler).with_data("temperature", 55);

        assert_eq!(call.domain, "water_heater");
        assert_eq!(call.service_id(), "water_heater.set_temperature");
        assert!(call.blocking);
        assert_eq!(
            call.data,
            json!({"entity_id": "water_heater.boiler", "temperature": 55})
        );
        assert_eq!(call.get::<i64>("temperature"), Some(55));
        assert_eq!(call.entity_ids(), vec!["water_heater.boiler"]);
    }

    #[test]
    fn test_entity_ids_list_form() {
        let call = ServiceCall {
            domain: "switch".into(),
            service: "turn_on".into(),
            data: json!({"entity_id": ["switch.a", "switch.b"]}),
            blocking: false,
        };
        assert_eq!(call.entity_ids(), vec!["switch.a", "switch.b"]);
    }

    #[test]
    fn test_blocking_defaults_when_deserializing() {
        let call: ServiceCall =
            serde_json::from_value(json!({"domain": "switch", "service": "toggle", "data": {}}))
                .unwrap();
        assert!(call.blocking);
        assert!(!call.non_blocking().blocking);
    }
}
