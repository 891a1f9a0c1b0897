//! Domain mapper server
//!
//! Loads a mapping file, seeds an in-process state store from its `states`
//! section, sets up every mapping and logs proxy updates until Ctrl-C.
//!
//! ```text
//! domain-mapper [configuration.yaml]
//! ```

mod devices;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dm_config::{load_config, MapperConfig};
use dm_core::{EntityId, Host, StateChangedData};
use dm_integration::DomainMapper;
use dm_service_registry::ServiceRegistry;
use dm_state_store::StateStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Republish entities of one domain as proxies in another
#[derive(Debug, Parser)]
#[command(name = "domain-mapper", version, about)]
struct Args {
    /// Mapping file to load
    #[arg(default_value = "configuration.yaml")]
    config: PathBuf,
}

/// The in-process host the mappings run against
struct Runtime {
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            states: Arc::new(StateStore::new()),
            services: Arc::new(ServiceRegistry::new()),
        }
    }

    fn host(&self) -> Host {
        Host::new(
            self.states.clone(),
            self.states.clone(),
            self.states.clone(),
            self.services.clone(),
        )
    }

    fn seed(&self, config: &MapperConfig) {
        for (entity_id, seed) in &config.states {
            self.states
                .set(entity_id.clone(), seed.state.clone(), seed.attributes.clone());
        }
        info!(entities = config.states.len(), "Seeded states");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let path = args.config;
    info!(config = %path.display(), "Starting domain mapper");
    let config = load_config(&path)
        .with_context(|| format!("loading mappings from {}", path.display()))?;

    let runtime = Runtime::new();
    devices::register_simulated_services(&runtime.states, &runtime.services);
    runtime.seed(&config);

    let mapper = DomainMapper::new(runtime.host());
    for entry in config.entries {
        mapper.add_entry(entry).context("adding mapping entry")?;
    }

    // Watch proxy output before the first proxy publishes
    let proxies: HashSet<EntityId> = mapper.proxy_entity_ids().into_iter().collect();
    let watcher = tokio::spawn(log_proxy_updates(runtime.states.subscribe(), proxies));

    for (entry_id, result) in mapper.setup_all() {
        if let Err(err) = result {
            warn!(%entry_id, error = %err, "Mapping not loaded");
        }
    }
    info!(proxies = mapper.proxies().len(), "Domain mapper is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    mapper.unload_all();
    runtime.states.shutdown();
    watcher.abort();

    Ok(())
}

async fn log_proxy_updates(
    mut changes: broadcast::Receiver<StateChangedData>,
    proxies: HashSet<EntityId>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if !proxies.contains(&change.entity_id) {
                    continue;
                }
                let entity_id = change.entity_id.to_string();
                match &change.new_state {
                    Some(state) => info!(%entity_id, state = %state.state, "Proxy updated"),
                    None => info!(%entity_id, "Proxy removed"),
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Proxy update log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
