//! Domain mapper integration
//!
//! Sets up one coordinator and one proxy per mapping entry and tears them
//! down again. [`DomainMapper`] owns all entries and walks each through the
//! [`EntryState`](dm_config::EntryState) lifecycle.

mod error;
mod mapper;
mod setup;

pub use error::{SetupError, SetupResult};
pub use mapper::DomainMapper;
pub use setup::{setup_mapping, unload_mapping, LoadedMapping, SetupOptions};
