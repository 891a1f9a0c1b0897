//! Mapping configuration for the domain mapper
//!
//! - [`MappingEntry`] - a persisted mapping with its optional options override
//! - [`MappingConfig`] - the validated, immutable form a coordinator is built from
//! - [`load_config`] - YAML loading with `!include` and `!env_var` support
//! - [`MappingFlow`] - the two-step flow that creates entries and options
//! - [`EntryState`] - the entry lifecycle state machine

mod entry_state;
mod error;
mod flow;
mod loader;
mod mapping;

pub use entry_state::{EntryState, InvalidTransition};
pub use error::{ConfigError, ConfigResult};
pub use flow::{MappingFlow, SourceStep};
pub use loader::{load_config, load_config_str, MapperConfig, SeedState, YamlLoader};
pub use mapping::{MappingConfig, MappingData, MappingEntry};
