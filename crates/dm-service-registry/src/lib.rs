//! Service registry with async handlers
//!
//! This crate provides the ServiceRegistry, the in-process command
//! dispatcher. Proxies never talk to devices directly: they call a service
//! such as `water_heater.turn_on`, and whoever registered that service
//! handles it.

use async_trait::async_trait;
use dashmap::DashMap;
use dm_core::{CommandDispatcher, ServiceCall, ServiceError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result type for service handlers
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// The service registry maps `domain.service` to a handler
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register (or replace) a service handler
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", domain.into(), service.into());
        debug!(service = %key, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(key, handler);
    }

    /// Call a service
    ///
    /// A blocking call waits for the handler and returns its result. A
    /// non-blocking call spawns the handler on the current runtime and
    /// returns as soon as the service is known to exist.
    #[instrument(skip(self, call), fields(service = %call.service_id()))]
    pub async fn call(&self, call: ServiceCall) -> ServiceResult {
        let handler = self
            .services
            .get(&call.service_id())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                warn!("Service not found");
                ServiceError::NotFound {
                    domain: call.domain.clone(),
                    service: call.service.clone(),
                }
            })?;

        debug!(blocking = call.blocking, "Calling service");
        if call.blocking {
            handler(call).await
        } else {
            tokio::spawn(async move {
                if let Err(err) = handler(call).await {
                    warn!(error = %err, "Non-blocking service call failed");
                }
            });
            Ok(())
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandDispatcher for ServiceRegistry {
    async fn invoke(&self, call: ServiceCall) -> Result<(), ServiceError> {
        self.call(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_core::EntityId;
    use std::sync::Mutex;

    fn boiler() -> EntityId {
        "water_heater.boiler".parse().unwrap()
    }

    #[tokio::test]
    async fn test_blocking_call_runs_handler() {
        let registry = ServiceRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        registry.register("water_heater", "set_temperature", move |call: ServiceCall| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(call.get::<f64>("temperature"));
                Ok(())
            }
        });

        let call = ServiceCall::for_entity("set_temperature", &boiler()).with_data("temperature", 48.5);
        registry.invoke(call).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(48.5)]);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = registry
            .call(ServiceCall::for_entity("turn_on", &boiler()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::NotFound {
                domain: "water_heater".into(),
                service: "turn_on".into()
            }
        );
    }

    #[tokio::test]
    async fn test_handler_failure_is_returned() {
        let registry = ServiceRegistry::new();
        registry.register("water_heater", "turn_on", |_call: ServiceCall| async {
            Err(ServiceError::CallFailed("burner fault".into()))
        });

        let err = registry
            .call(ServiceCall::for_entity("turn_on", &boiler()))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::CallFailed("burner fault".into()));
    }

    #[tokio::test]
    async fn test_non_blocking_call_returns_immediately() {
        let registry = ServiceRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        registry.register("water_heater", "turn_off", move |_call: ServiceCall| {
            let tx = tx.clone();
            async move {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        });

        registry
            .call(ServiceCall::for_entity("turn_off", &boiler()).non_blocking())
            .await
            .unwrap();
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_replaces_handler() {
        let registry = ServiceRegistry::new();
        registry.register("switch", "turn_on", |_call: ServiceCall| async {
            Err(ServiceError::CallFailed("old handler".into()))
        });
        registry.register("switch", "turn_on", |_call: ServiceCall| async { Ok(()) });

        let pump: EntityId = "switch.pump".parse().unwrap();
        registry
            .call(ServiceCall::for_entity("turn_on", &pump))
            .await
            .unwrap();
    }
}
