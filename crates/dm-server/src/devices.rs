//! Simulated devices behind the seeded states
//!
//! Without real hardware, service calls on the source domains are applied
//! straight to the state store so proxies have something to follow.

use std::sync::Arc;

use dm_core::{EntityId, ServiceCall, ServiceError};
use dm_service_registry::ServiceRegistry;
use dm_state_store::StateStore;
use serde_json::Value;
use tracing::debug;

/// Register `water_heater` and `switch` services that update the store
pub fn register_simulated_services(states: &Arc<StateStore>, services: &ServiceRegistry) {
    let simulate = |service: &'static str, apply: fn(&mut Update, &ServiceCall)| {
        let states = states.clone();
        move |call: ServiceCall| {
            let result = apply_to_targets(&states, &call, apply);
            debug!(service, ok = result.is_ok(), "Simulated service call");
            async move { result }
        }
    };

    services.register("water_heater", "turn_on", simulate("turn_on", |u, _| u.state = "gas".into()));
    services.register("water_heater", "turn_off", simulate("turn_off", |u, _| u.state = "off".into()));
    services.register(
        "water_heater",
        "set_temperature",
        simulate("set_temperature", |u, call| {
            if let Some(t) = call.data.get("temperature") {
                u.attributes.insert("temperature".into(), t.clone());
            }
        }),
    );
    services.register(
        "water_heater",
        "set_away_mode",
        simulate("set_away_mode", |u, call| {
            let away = call.get::<bool>("away_mode").unwrap_or(false);
            let value = if away { "on" } else { "off" };
            u.attributes.insert("away_mode".into(), Value::String(value.into()));
        }),
    );

    services.register("switch", "turn_on", simulate("turn_on", |u, _| u.state = "on".into()));
    services.register("switch", "turn_off", simulate("turn_off", |u, _| u.state = "off".into()));
    services.register(
        "switch",
        "toggle",
        simulate("toggle", |u, _| {
            let next = if u.state == "on" { "off" } else { "on" };
            u.state = next.to_string();
        }),
    );
}

/// Pending change of one entity
pub struct Update {
    pub state: String,
    pub attributes: dm_core::Attributes,
}

fn apply_to_targets(
    states: &StateStore,
    call: &ServiceCall,
    apply: fn(&mut Update, &ServiceCall),
) -> Result<(), ServiceError> {
    let targets = call.entity_ids();
    if targets.is_empty() {
        return Err(ServiceError::InvalidData("entity_id is required".into()));
    }

    for target in targets {
        let entity_id: EntityId = target
            .parse()
            .map_err(|e: dm_core::EntityIdError| ServiceError::InvalidData(e.to_string()))?;
        let current = states
            .get(&target)
            .ok_or_else(|| ServiceError::CallFailed(format!("{target} does not exist")))?;

        let mut update = Update {
            state: current.state,
            attributes: current.attributes,
        };
        apply(&mut update, call);
        states.set(entity_id, update.state, update.attributes);
    }
    Ok(())
}
