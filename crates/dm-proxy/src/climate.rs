//! Climate proxy for a water heater

use std::fmt;
use std::str::FromStr;

use dm_core::attrs::ATTR_FRIENDLY_NAME;
use dm_core::states::{STATE_ON, STATE_UNAVAILABLE};
use dm_core::Snapshot;
use serde_json::{json, Value};

use crate::context::{ProxyContext, Rendered};
use crate::error::ProxyError;

/// Water heater state that counts as heating
pub const STATE_GAS: &str = "gas";

pub const ATTR_AWAY_MODE: &str = "away_mode";
pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_MIN_TEMP: &str = "min_temp";
pub const ATTR_MAX_TEMP: &str = "max_temp";

pub const SERVICE_TURN_ON: &str = "turn_on";
pub const SERVICE_TURN_OFF: &str = "turn_off";
pub const SERVICE_SET_TEMPERATURE: &str = "set_temperature";
pub const SERVICE_SET_AWAY_MODE: &str = "set_away_mode";

pub const TEMPERATURE_UNIT: &str = "°C";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HvacMode {
    Heat,
    Off,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HvacMode::Heat => "heat",
            HvacMode::Off => "off",
        }
    }

    /// `gas` heats, anything else is off
    pub fn from_source_state(state: &str) -> Self {
        if state == STATE_GAS {
            HvacMode::Heat
        } else {
            HvacMode::Off
        }
    }
}

impl FromStr for HvacMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heat" => Ok(HvacMode::Heat),
            "off" => Ok(HvacMode::Off),
            other => Err(ProxyError::UnsupportedHvacMode(other.to_string())),
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetMode {
    None,
    Away,
}

impl PresetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PresetMode::None => "none",
            PresetMode::Away => "away",
        }
    }
}

impl FromStr for PresetMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PresetMode::None),
            "away" => Ok(PresetMode::Away),
            other => Err(ProxyError::UnsupportedPresetMode(other.to_string())),
        }
    }
}

impl fmt::Display for PresetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Supported climate features, with the host's bit values
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClimateFeature: u32 {
        const TARGET_TEMPERATURE = 1;
        const PRESET_MODE = 16;
        const TURN_OFF = 128;
        const TURN_ON = 256;
    }
}

/// A water heater republished as a climate entity
#[derive(Debug)]
pub struct ProxyClimate {
    ctx: ProxyContext,
}

impl ProxyClimate {
    pub fn new(ctx: ProxyContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProxyContext {
        &self.ctx
    }

    /// `None` while the source is unknown
    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.ctx
            .snapshot()
            .map(|s| HvacMode::from_source_state(&s.status))
    }

    pub fn hvac_modes(&self) -> [HvacMode; 2] {
        [HvacMode::Heat, HvacMode::Off]
    }

    pub fn preset_mode(&self) -> Option<PresetMode> {
        self.ctx.snapshot().map(|s| preset_of(&s))
    }

    /// `away` is only offered when the source exposes an away mode
    pub fn preset_modes(&self) -> Vec<PresetMode> {
        match self.ctx.snapshot() {
            Some(s) if has_away_mode(&s) => vec![PresetMode::None, PresetMode::Away],
            _ => vec![PresetMode::None],
        }
    }

    pub fn supported_features(&self) -> ClimateFeature {
        let mut features =
            ClimateFeature::TARGET_TEMPERATURE | ClimateFeature::TURN_ON | ClimateFeature::TURN_OFF;
        if self.ctx.snapshot().is_some_and(|s| has_away_mode(&s)) {
            features |= ClimateFeature::PRESET_MODE;
        }
        features
    }

    pub fn temperature_unit(&self) -> &'static str {
        TEMPERATURE_UNIT
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.number(ATTR_TEMPERATURE)
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.number(ATTR_CURRENT_TEMPERATURE)
    }

    pub fn min_temp(&self) -> Option<f64> {
        self.number(ATTR_MIN_TEMP)
    }

    pub fn max_temp(&self) -> Option<f64> {
        self.number(ATTR_MAX_TEMP)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.ctx.snapshot().and_then(|s| s.attribute::<f64>(key))
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), ProxyError> {
        match mode {
            HvacMode::Heat => self.turn_on().await,
            HvacMode::Off => self.turn_off().await,
        }
    }

    pub async fn turn_on(&self) -> Result<(), ProxyError> {
        self.ctx.command(SERVICE_TURN_ON, Vec::new()).await
    }

    pub async fn turn_off(&self) -> Result<(), ProxyError> {
        self.ctx.command(SERVICE_TURN_OFF, Vec::new()).await
    }

    pub async fn set_temperature(&self, temperature: f64) -> Result<(), ProxyError> {
        self.ctx
            .command(
                SERVICE_SET_TEMPERATURE,
                vec![(ATTR_TEMPERATURE, json!(temperature))],
            )
            .await
    }

    /// `away` turns the source's away mode on, `none` turns it off
    pub async fn set_preset_mode(&self, preset: PresetMode) -> Result<(), ProxyError> {
        self.ctx
            .command(
                SERVICE_SET_AWAY_MODE,
                vec![(ATTR_AWAY_MODE, json!(preset == PresetMode::Away))],
            )
            .await
    }

    pub fn render(&self) -> Rendered {
        let snapshot = self.ctx.snapshot();
        let Some(snapshot) = snapshot.as_deref() else {
            let mut rendered = Rendered::new(STATE_UNAVAILABLE);
            rendered.set(ATTR_FRIENDLY_NAME, self.ctx.name());
            rendered.attributes.extend(self.ctx.extra_attributes(None));
            return rendered;
        };

        let mut rendered = Rendered::new(HvacMode::from_source_state(&snapshot.status).as_str());
        rendered.set(ATTR_FRIENDLY_NAME, self.ctx.name());
        rendered.set(
            "hvac_modes",
            json!(self.hvac_modes().map(HvacMode::as_str)),
        );
        let presets: Vec<&str> = self.preset_modes().into_iter().map(PresetMode::as_str).collect();
        rendered.set("preset_modes", json!(presets));
        rendered.set("preset_mode", preset_of(snapshot).as_str());
        rendered.set("supported_features", self.supported_features().bits());
        rendered.set("temperature_unit", TEMPERATURE_UNIT);
        for key in [ATTR_TEMPERATURE, ATTR_CURRENT_TEMPERATURE, ATTR_MIN_TEMP, ATTR_MAX_TEMP] {
            rendered.set_opt(key, snapshot.attributes.get(key).cloned());
        }
        rendered
            .attributes
            .extend(self.ctx.extra_attributes(Some(snapshot)));
        rendered
    }
}

fn has_away_mode(snapshot: &Snapshot) -> bool {
    snapshot
        .attributes
        .get(ATTR_AWAY_MODE)
        .is_some_and(|v| !v.is_null())
}

fn preset_of(snapshot: &Snapshot) -> PresetMode {
    match snapshot.attributes.get(ATTR_AWAY_MODE) {
        Some(Value::String(mode)) if mode == STATE_ON => PresetMode::Away,
        _ => PresetMode::None,
    }
}
