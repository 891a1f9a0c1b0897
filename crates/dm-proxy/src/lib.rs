//! Proxy entities for the domain mapper
//!
//! A proxy republishes its coordinator's snapshot under the target domain
//! and turns target-domain commands into service calls on the source
//! entity. Each supported target has one variant of [`ProxyEntity`]:
//!
//! - [`ProxyClimate`] - a `water_heater` shown as `climate`
//! - [`ProxyBinarySensor`] - a `switch` shown as `binary_sensor`

mod binary_sensor;
mod climate;
mod context;
mod entity;
mod error;

pub use binary_sensor::ProxyBinarySensor;
pub use climate::{ClimateFeature, HvacMode, PresetMode, ProxyClimate};
pub use context::{
    proxy_identity, DeviceInfo, ProxyContext, Rendered, ATTR_ATTRIBUTE, ATTR_SOURCE_ENTITY,
};
pub use entity::ProxyEntity;
pub use error::ProxyError;
