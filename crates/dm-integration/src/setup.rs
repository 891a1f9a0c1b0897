//! Setup and unload of a single mapping

use std::sync::Arc;

use dm_config::MappingConfig;
use dm_coordinator::{CoordinatorError, StateTrackingCoordinator};
use dm_core::Host;
use dm_proxy::ProxyEntity;
use tracing::{info, instrument, warn};

use crate::error::SetupResult;

/// Policy knobs for entry setup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupOptions {
    /// Fail setup instead of starting unavailable when the source entity
    /// is missing
    pub abort_on_missing_source: bool,
}

/// The live parts of a loaded mapping
#[derive(Debug, Clone)]
pub struct LoadedMapping {
    pub coordinator: Arc<StateTrackingCoordinator>,
    pub proxy: Arc<ProxyEntity>,
}

/// Subscribe, read the source once, then attach the proxy
///
/// A missing source only fails setup under
/// [`SetupOptions::abort_on_missing_source`]; otherwise the proxy starts
/// unavailable and recovers on the next change of the source.
#[instrument(skip_all, fields(entry_id = %config.entry_id, source = %config.source_entity))]
pub fn setup_mapping(
    config: MappingConfig,
    host: Host,
    options: SetupOptions,
) -> SetupResult<LoadedMapping> {
    let coordinator = StateTrackingCoordinator::new(config, host)?;

    match coordinator.first_refresh() {
        Ok(()) => {}
        Err(err @ CoordinatorError::UpstreamUnavailable { .. }) if options.abort_on_missing_source => {
            coordinator.teardown();
            return Err(err.into());
        }
        Err(err) => warn!(error = %err, "Starting unavailable"),
    }

    let proxy = match ProxyEntity::for_coordinator(coordinator.clone()) {
        Ok(proxy) => proxy,
        Err(err) => {
            coordinator.teardown();
            return Err(err.into());
        }
    };

    if let Err(err) = proxy.attach() {
        if let Err(cleanup) = proxy.detach() {
            warn!(error = %cleanup, "Failed to withdraw proxy state after attach failure");
        }
        coordinator.teardown();
        return Err(err.into());
    }

    info!(proxy = %proxy.entity_id(), "Mapping set up");
    Ok(LoadedMapping { coordinator, proxy })
}

/// Detach the proxy and cancel the subscription
#[instrument(skip_all, fields(proxy = %mapping.proxy.entity_id()))]
pub fn unload_mapping(mapping: LoadedMapping) {
    if let Err(err) = mapping.proxy.detach() {
        warn!(error = %err, "Failed to withdraw proxy state");
    }
    mapping.coordinator.teardown();
    info!("Mapping unloaded");
}
