//! Isolated host with captured service calls

use dm_core::{Attributes, EntityId, Host, ServiceCall, State};
use dm_service_registry::ServiceRegistry;
use dm_state_store::StateStore;
use std::sync::{Arc, Mutex};

/// A test host: real state store and service registry, with captured calls
pub struct TestHost {
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    captured_service_calls: Arc<Mutex<Vec<ServiceCall>>>,
}

#[allow(dead_code)]
impl TestHost {
    pub fn new() -> Self {
        Self {
            states: Arc::new(StateStore::new()),
            services: Arc::new(ServiceRegistry::new()),
            captured_service_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The collaborator bundle handed to the mapper
    pub fn host(&self) -> Host {
        Host::new(
            self.states.clone(),
            self.states.clone(),
            self.states.clone(),
            self.services.clone(),
        )
    }

    pub fn set_state(&self, entity_id: &str, state: &str, attributes: serde_json::Value) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        let attributes: Attributes =
            serde_json::from_value(attributes).expect("attributes must be an object");
        self.states.set(entity_id, state, attributes)
    }

    pub fn remove_state(&self, entity_id: &str) {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.states.remove(&entity_id);
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Register a handler that records the call and then applies `effect`
    pub fn capture_service<F>(&self, domain: &str, service: &str, effect: F)
    where
        F: Fn(&TestStates, &ServiceCall) + Send + Sync + 'static,
    {
        let captured = self.captured_service_calls.clone();
        let states = TestStates(self.states.clone());
        self.services.register(domain, service, move |call: ServiceCall| {
            captured.lock().unwrap().push(call.clone());
            effect(&states, &call);
            async { Ok(()) }
        });
    }

    /// A water heater that obeys on/off, temperature and away mode
    pub fn mock_water_heater(&self, entity_id: &'static str) {
        self.capture_service("water_heater", "turn_on", move |states, _| {
            states.update(entity_id, Some("gas"), None);
        });
        self.capture_service("water_heater", "turn_off", move |states, _| {
            states.update(entity_id, Some("off"), None);
        });
        self.capture_service("water_heater", "set_temperature", move |states, call| {
            let temperature = call.get::<f64>("temperature");
            states.update(entity_id, None, Some(("temperature", serde_json::json!(temperature))));
        });
        self.capture_service("water_heater", "set_away_mode", move |states, call| {
            let away = if call.get::<bool>("away_mode") == Some(true) { "on" } else { "off" };
            states.update(entity_id, None, Some(("away_mode", serde_json::json!(away))));
        });
    }

    pub fn captured_service_calls(&self) -> Vec<ServiceCall> {
        self.captured_service_calls.lock().unwrap().clone()
    }

    pub fn service_calls(&self, domain: &str) -> Vec<ServiceCall> {
        self.captured_service_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain == domain)
            .cloned()
            .collect()
    }

    pub fn clear_service_calls(&self) {
        self.captured_service_calls.lock().unwrap().clear();
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

/// State store access for service effects
pub struct TestStates(Arc<StateStore>);

impl TestStates {
    /// Rewrite an entity, optionally changing its state or one attribute
    pub fn update(&self, entity_id: &str, state: Option<&str>, attribute: Option<(&str, serde_json::Value)>) {
        let current = self.0.get(entity_id).expect("entity must exist");
        let mut attributes = current.attributes.clone();
        if let Some((key, value)) = attribute {
            attributes.insert(key.to_string(), value);
        }
        self.0.set(
            current.entity_id.clone(),
            state.unwrap_or(current.state.as_str()),
            attributes,
        );
    }
}
