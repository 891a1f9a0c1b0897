//! The closed set of proxy variants and their listener lifecycle

use std::sync::{Arc, PoisonError, Weak};

use dm_coordinator::{ListenerError, StateTrackingCoordinator};
use dm_core::{Domain, EntityId};
use tracing::{debug, instrument};

use crate::binary_sensor::ProxyBinarySensor;
use crate::climate::ProxyClimate;
use crate::context::{DeviceInfo, ProxyContext, Rendered};
use crate::error::ProxyError;

/// A proxy entity, one variant per supported target domain
#[derive(Debug)]
pub enum ProxyEntity {
    Climate(ProxyClimate),
    BinarySensor(ProxyBinarySensor),
}

impl ProxyEntity {
    /// Build the variant matching the coordinator's target domain
    pub fn for_coordinator(coordinator: Arc<StateTrackingCoordinator>) -> Result<Arc<Self>, ProxyError> {
        let target = coordinator.target_domain();
        let ctx = ProxyContext::new(coordinator)?;
        let proxy = match target {
            Domain::Climate => ProxyEntity::Climate(ProxyClimate::new(ctx)),
            Domain::BinarySensor => ProxyEntity::BinarySensor(ProxyBinarySensor::new(ctx)),
            other => return Err(ProxyError::UnsupportedTarget(other)),
        };
        Ok(Arc::new(proxy))
    }

    pub fn context(&self) -> &ProxyContext {
        match self {
            ProxyEntity::Climate(p) => p.context(),
            ProxyEntity::BinarySensor(p) => p.context(),
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            ProxyEntity::Climate(_) => Domain::Climate,
            ProxyEntity::BinarySensor(_) => Domain::BinarySensor,
        }
    }

    pub fn as_climate(&self) -> Option<&ProxyClimate> {
        match self {
            ProxyEntity::Climate(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_binary_sensor(&self) -> Option<&ProxyBinarySensor> {
        match self {
            ProxyEntity::BinarySensor(p) => Some(p),
            _ => None,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        self.context().entity_id()
    }

    pub fn unique_id(&self) -> &str {
        self.context().unique_id()
    }

    pub fn name(&self) -> String {
        self.context().name()
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.context().device_info()
    }

    pub fn is_available(&self) -> bool {
        self.context().is_available()
    }

    /// Proxies are pushed to, never polled
    pub fn should_poll(&self) -> bool {
        false
    }

    pub fn render(&self) -> Rendered {
        match self {
            ProxyEntity::Climate(p) => p.render(),
            ProxyEntity::BinarySensor(p) => p.render(),
        }
    }

    /// Render from the current snapshot and publish through the host
    pub fn write_state(&self) -> Result<(), ProxyError> {
        let Rendered { state, attributes } = self.render();
        let ctx = self.context();
        ctx.host()
            .writer
            .write_state(ctx.entity_id(), &state, attributes)?;
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.context()
            .listener
            .lock()
            .map(|l| l.is_some())
            .unwrap_or(false)
    }

    /// Register with the coordinator and publish the current state
    ///
    /// Attaching an attached proxy does nothing.
    #[instrument(skip(self), fields(entity_id = %self.entity_id()))]
    pub fn attach(self: &Arc<Self>) -> Result<(), ProxyError> {
        let ctx = self.context();
        {
            let mut slot = ctx.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                debug!("Proxy already attached");
                return Ok(());
            }

            let weak: Weak<Self> = Arc::downgrade(self);
            let id = ctx.coordinator().add_listener(move || match weak.upgrade() {
                Some(proxy) => proxy.write_state().map_err(ListenerError::failed),
                None => Ok(()),
            });
            *slot = Some(id);
        }

        debug!("Proxy attached");
        self.write_state()
    }

    /// Unregister from the coordinator and withdraw the published state
    #[instrument(skip(self), fields(entity_id = %self.entity_id()))]
    pub fn detach(&self) -> Result<(), ProxyError> {
        let ctx = self.context();
        let id = ctx
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(id) = id else {
            return Ok(());
        };
        ctx.coordinator().remove_listener(id);
        ctx.host().writer.remove_state(ctx.entity_id())?;
        debug!("Proxy detached");
        Ok(())
    }
}
