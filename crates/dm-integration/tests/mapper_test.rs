//! End-to-end tests of entry setup, proxies and unload

mod common;

use common::TestHost;
use dm_config::{load_config, ConfigError, EntryState, MappingData, MappingEntry};
use dm_core::Domain;
use dm_coordinator::CoordinatorError;
use dm_integration::{DomainMapper, SetupError, SetupOptions};
use dm_proxy::{HvacMode, PresetMode};
use serde_json::json;
use tokio_test::assert_ok;

fn boiler_entry() -> MappingEntry {
    MappingEntry::new(
        MappingData::new(Domain::Climate, "water_heater.boiler".parse().unwrap()).with_name("Boiler"),
    )
}

fn pump_entry() -> MappingEntry {
    MappingEntry::new(
        MappingData::new(Domain::BinarySensor, "switch.pump".parse().unwrap())
            .with_device_class("running"),
    )
}

#[test]
fn test_setup_publishes_proxies() {
    let hass = TestHost::new();
    hass.set_state("water_heater.boiler", "gas", json!({"temperature": 55}));
    hass.set_state("switch.pump", "off", json!({}));

    let mapper = DomainMapper::new(hass.host());
    let boiler = mapper.add_entry(boiler_entry()).unwrap();
    let pump = mapper.add_entry(pump_entry()).unwrap();
    assert_eq!(mapper.len(), 2);
    assert_eq!(mapper.entry_state(&boiler), Some(EntryState::NotLoaded));

    let results = mapper.setup_all();
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(mapper.entry_state(&boiler), Some(EntryState::Loaded));
    assert_eq!(mapper.entry_state(&pump), Some(EntryState::Loaded));

    hass.assert_state("climate.domain_mapper_boiler", "heat");
    hass.assert_state("binary_sensor.domain_mapper_pump", "off");

    let climate = hass.get_state("climate.domain_mapper_boiler").unwrap();
    assert_eq!(climate.attributes["friendly_name"], json!("Boiler"));
    assert_eq!(climate.attributes["temperature"], json!(55));

    hass.set_state("switch.pump", "on", json!({}));
    hass.assert_state("binary_sensor.domain_mapper_pump", "on");

    let names: Vec<_> = mapper.proxies().iter().map(|p| p.entity_id().to_string()).collect();
    assert_eq!(
        names,
        vec!["climate.domain_mapper_boiler", "binary_sensor.domain_mapper_pump"]
    );
}

#[test]
fn test_missing_source_starts_unavailable_and_recovers() {
    let hass = TestHost::new();
    let mapper = DomainMapper::new(hass.host());
    let pump = mapper.add_entry(pump_entry()).unwrap();

    assert_ok!(mapper.setup(&pump));
    assert_eq!(mapper.entry_state(&pump), Some(EntryState::Loaded));
    hass.assert_state("binary_sensor.domain_mapper_pump", "unavailable");

    hass.set_state("switch.pump", "on", json!({}));
    hass.assert_state("binary_sensor.domain_mapper_pump", "on");

    hass.remove_state("switch.pump");
    hass.assert_state("binary_sensor.domain_mapper_pump", "unavailable");
    assert!(mapper.coordinator(&pump).unwrap().current_snapshot().is_none());
}

#[test]
fn test_missing_source_aborts_when_configured() {
    let hass = TestHost::new();
    let mapper = DomainMapper::with_options(
        hass.host(),
        SetupOptions {
            abort_on_missing_source: true,
        },
    );
    let pump = mapper.add_entry(pump_entry()).unwrap();

    let err = mapper.setup(&pump).unwrap_err();
    assert!(matches!(
        err,
        SetupError::Coordinator(CoordinatorError::UpstreamUnavailable { .. })
    ));
    assert_eq!(mapper.entry_state(&pump), Some(EntryState::SetupError));
    assert!(mapper.setup_error(&pump).unwrap().contains("switch.pump"));
    assert!(mapper.proxy(&pump).is_none());
    assert_eq!(hass.states.tracker_count("switch.pump"), 0);
    assert!(hass.get_state("binary_sensor.domain_mapper_pump").is_none());

    // once the source exists, a reload succeeds
    hass.set_state("switch.pump", "on", json!({}));
    assert_ok!(mapper.reload(&pump));
    assert_eq!(mapper.entry_state(&pump), Some(EntryState::Loaded));
    hass.assert_state("binary_sensor.domain_mapper_pump", "on");
}

#[test]
fn test_unload_withdraws_proxy_and_subscription() {
    let hass = TestHost::new();
    hass.set_state("switch.pump", "on", json!({}));
    let mapper = DomainMapper::new(hass.host());
    let pump = mapper.add_entry(pump_entry()).unwrap();
    assert_ok!(mapper.setup(&pump));
    assert_eq!(hass.states.tracker_count("switch.pump"), 1);

    assert_ok!(mapper.unload(&pump));
    assert_eq!(mapper.entry_state(&pump), Some(EntryState::NotLoaded));
    assert!(mapper.proxy(&pump).is_none());
    assert!(hass.get_state("binary_sensor.domain_mapper_pump").is_none());
    assert_eq!(hass.states.tracker_count("switch.pump"), 0);

    // source changes no longer reach anything
    hass.set_state("switch.pump", "off", json!({}));
    assert!(hass.get_state("binary_sensor.domain_mapper_pump").is_none());

    // unloading twice is an invalid transition
    assert!(matches!(mapper.unload(&pump), Err(SetupError::Transition(_))));
}

#[test]
fn test_setup_twice_is_rejected() {
    let hass = TestHost::new();
    hass.set_state("switch.pump", "on", json!({}));
    let mapper = DomainMapper::new(hass.host());
    let pump = mapper.add_entry(pump_entry()).unwrap();

    assert_ok!(mapper.setup(&pump));
    assert!(matches!(mapper.setup(&pump), Err(SetupError::Transition(_))));
    assert_eq!(hass.states.tracker_count("switch.pump"), 1);
}

#[test]
fn test_proxy_entity_ids_known_before_setup() {
    let hass = TestHost::new();
    hass.set_state("switch.domain_mapper_x", "on", json!({}));

    let mapper = DomainMapper::new(hass.host());
    mapper.add_entry(boiler_entry()).unwrap();
    mapper.add_entry(pump_entry()).unwrap();
    mapper.add_entry(MappingEntry::new(MappingData::new(
        Domain::BinarySensor,
        "switch.domain_mapper_x".parse().unwrap(),
    )))
    .unwrap();

    let planned: Vec<String> = mapper
        .proxy_entity_ids()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        planned,
        vec![
            "climate.domain_mapper_boiler",
            "binary_sensor.domain_mapper_pump",
            "binary_sensor.domain_mapper_domain_mapper_x",
        ]
    );
    // a source whose name carries the prefix is not one of them
    assert!(!planned.contains(&"switch.domain_mapper_x".to_string()));

    mapper.setup_all();
    let live: Vec<String> = mapper
        .proxies()
        .iter()
        .map(|p| p.entity_id().to_string())
        .collect();
    assert_eq!(live, planned);
}

#[test]
fn test_entry_bookkeeping() {
    let hass = TestHost::new();
    let mapper = DomainMapper::new(hass.host());

    let entry = pump_entry();
    let id = mapper.add_entry(entry.clone()).unwrap();
    assert!(matches!(
        mapper.add_entry(entry),
        Err(SetupError::Config(ConfigError::DuplicateEntry { .. }))
    ));

    let invalid = MappingEntry::new(MappingData::new(
        Domain::Climate,
        "switch.pump".parse().unwrap(),
    ));
    assert!(matches!(
        mapper.add_entry(invalid),
        Err(SetupError::Config(ConfigError::UnsupportedMapping { .. }))
    ));

    assert!(matches!(mapper.setup("nope"), Err(SetupError::EntryNotFound(_))));

    let removed = mapper.remove_entry(&id).unwrap();
    assert_eq!(removed.entry_id, id);
    assert!(mapper.is_empty());
}

#[test]
fn test_update_options_repoints_proxy() {
    let hass = TestHost::new();
    hass.set_state("switch.pump", "on", json!({}));
    hass.set_state("switch.pump_2", "off", json!({}));

    let mapper = DomainMapper::new(hass.host());
    let id = mapper.add_entry(pump_entry()).unwrap();
    assert_ok!(mapper.setup(&id));
    hass.assert_state("binary_sensor.domain_mapper_pump", "on");

    let options = MappingData::new(Domain::BinarySensor, "switch.pump_2".parse().unwrap());
    assert_ok!(mapper.update_options(&id, options));

    assert_eq!(mapper.entry_state(&id), Some(EntryState::Loaded));
    assert!(hass.get_state("binary_sensor.domain_mapper_pump").is_none());
    hass.assert_state("binary_sensor.domain_mapper_pump_2", "off");
    assert_eq!(hass.states.tracker_count("switch.pump"), 0);

    // options replace the data entirely, so the device class is gone
    let proxy = mapper.proxy(&id).unwrap();
    assert_eq!(proxy.as_binary_sensor().unwrap().device_class(), None);
}

#[tokio::test]
async fn test_climate_commands_round_trip() {
    let hass = TestHost::new();
    hass.set_state(
        "water_heater.boiler",
        "off",
        json!({"temperature": 50, "away_mode": "off", "friendly_name": "Boiler"}),
    );
    hass.mock_water_heater("water_heater.boiler");

    let mapper = DomainMapper::new(hass.host());
    let id = mapper.add_entry(boiler_entry()).unwrap();
    assert_ok!(mapper.setup(&id));

    let proxy = mapper.proxy(&id).unwrap();
    let climate = proxy.as_climate().unwrap();
    assert_eq!(climate.hvac_mode(), Some(HvacMode::Off));

    assert_ok!(climate.set_hvac_mode(HvacMode::Heat).await);
    hass.assert_state("climate.domain_mapper_boiler", "heat");

    assert_ok!(climate.set_temperature(60.0).await);
    assert_eq!(climate.target_temperature(), Some(60.0));

    assert_ok!(climate.set_preset_mode(PresetMode::Away).await);
    assert_eq!(climate.preset_mode(), Some(PresetMode::Away));
    let published = hass.get_state("climate.domain_mapper_boiler").unwrap();
    assert_eq!(published.attributes["preset_mode"], json!("away"));

    assert_ok!(climate.turn_off().await);
    hass.assert_state("climate.domain_mapper_boiler", "off");

    let services: Vec<_> = hass
        .service_calls("water_heater")
        .iter()
        .map(|c| c.service.clone())
        .collect();
    assert_eq!(services, vec!["turn_on", "set_temperature", "set_away_mode", "turn_off"]);
    assert!(hass.service_calls("climate").is_empty());
}

#[test]
fn test_entries_from_yaml() {
    let yaml = r#"
domain_mapper:
  - entry_id: boiler
    target_domain: climate
    source_entity: water_heater.boiler
  - entry_id: pump
    target_domain: binary_sensor
    source_entity: switch.pump
states:
  water_heater.boiler:
    state: gas
  switch.pump:
    state: "on"
"#;
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("configuration.yaml");
    std::fs::write(&path, yaml).unwrap();
    let config = load_config(&path).unwrap();

    let hass = TestHost::new();
    for (entity_id, seed) in &config.states {
        hass.states.set(entity_id.clone(), seed.state.clone(), seed.attributes.clone());
    }

    let mapper = DomainMapper::new(hass.host());
    for entry in config.entries {
        mapper.add_entry(entry).unwrap();
    }
    assert!(mapper.setup_all().iter().all(|(_, r)| r.is_ok()));
    assert_eq!(mapper.entry_ids(), vec!["boiler", "pump"]);

    hass.assert_state("climate.domain_mapper_boiler", "heat");
    hass.assert_state("binary_sensor.domain_mapper_pump", "on");

    mapper.unload_all();
    assert_eq!(mapper.entry_state("boiler"), Some(EntryState::NotLoaded));
    assert!(hass.get_state("climate.domain_mapper_boiler").is_none());
}
