//! Service assembly.
//!
//! [`PlaygroundSystem`] wires the orchestrator to its collaborators from a
//! [`DockyardConfig`]: the runtime factory and storage are passed in, while
//! provisioners, the event bus and the id generator are built here. It also
//! owns the background tasks (event log, reaper) and the HTTP server.

use crate::api::ApiServer;
use crate::cli::DockyardConfig;
use crate::error::Result;
use crate::event::EventBus;
use crate::id::{IdGenerator, UuidGenerator};
use crate::orchestrator::Orchestrator;
use crate::provisioner::{
    DindProvisioner, InstanceProvisionerFactory, OverlaySessionProvisioner, WindowsPoolProvisioner,
};
use crate::reaper::SessionReaper;
use crate::runtime::RuntimeFactory;
use crate::storage::Storage;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A fully assembled control plane.
pub struct PlaygroundSystem {
    config: DockyardConfig,
    orchestrator: Arc<Orchestrator>,
    events: Arc<EventBus>,
}

impl PlaygroundSystem {
    /// Seed playgrounds into `storage` and build the orchestrator.
    pub async fn new(
        config: DockyardConfig,
        factory: Arc<dyn RuntimeFactory>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        for playground in config.seed_playgrounds() {
            storage.playground_put(&playground).await?;
            info!(
                "Playground {} registered (windows instances: {})",
                playground.id, playground.allow_windows_instances
            );
        }

        let events = Arc::new(EventBus::default());
        let generator: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);

        let session_provisioner = OverlaySessionProvisioner::new(Arc::clone(&factory))
            .with_router_name(config.runtime.router_container.clone())
            .with_network_driver(config.runtime.network_driver.clone());

        let dind = DindProvisioner::new(
            Arc::clone(&generator),
            Arc::clone(&factory),
            Arc::clone(&storage),
            config.dind_config(),
        );
        let windows = WindowsPoolProvisioner::new(config.windows_pool.clone(), Arc::clone(&storage));
        info!("Windows pool capacity: {}", windows.capacity());

        let orchestrator = Arc::new(Orchestrator::new(
            factory,
            events.clone(),
            storage,
            Arc::new(session_provisioner),
            InstanceProvisionerFactory::new(Arc::new(windows), Arc::new(dind)),
            generator,
        ));

        Ok(Self {
            config,
            orchestrator,
            events,
        })
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &DockyardConfig {
        &self.config
    }

    /// Log every lifecycle event until the bus closes.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut receiver = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => info!(
                        "event {} session={} args={:?}",
                        event.kind, event.session_id, event.args
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event logger lagged, {} events skipped", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        SessionReaper::new(self.orchestrator(), self.config.reaper_config()).start()
    }

    /// Serve the API on `addr` until `shutdown` resolves.
    pub async fn serve<S>(&self, addr: SocketAddr, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        ApiServer::new(self.orchestrator(), self.config.request_timeout())
            .run(addr, shutdown)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::storage::MemoryStorage;
    use crate::testing::{MockFactory, MockRuntime};
    use crate::types::{InstanceConfig, Playground, SessionConfig};

    #[tokio::test]
    async fn test_system_seeds_playgrounds_and_publishes_events() {
        let runtime = Arc::new(MockRuntime::new("tcp://10.0.0.5:2375"));
        let factory = Arc::new(MockFactory::new(runtime.clone()));
        let storage = Arc::new(MemoryStorage::new());

        let mut config = DockyardConfig::default();
        config.playgrounds = vec![Playground::new("foobar")];
        config.runtime.router_container = "edge-router".to_string();

        let system = PlaygroundSystem::new(config, factory, storage.clone())
            .await
            .unwrap();
        assert!(storage.playground_get("foobar").await.is_ok());
        assert!(storage.playground_get("default").await.is_err());

        let mut events = system.events().subscribe();
        let session = system
            .orchestrator()
            .session_new(SessionConfig {
                playground_id: "foobar".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(session.id.len(), 32);
        assert_eq!(session.host, "10.0.0.5");

        let instance = system
            .orchestrator()
            .instance_new(&session, InstanceConfig::default())
            .await
            .unwrap();
        assert!(instance.name.starts_with(session.short_id()));
        assert_eq!(instance.hostname, "node1");

        assert_eq!(events.recv().await.unwrap().kind, EventKind::SessionNew);
        let created = events.recv().await.unwrap();
        assert_eq!(created.kind, EventKind::InstanceNew);
        assert_eq!(created.args[0], instance.name);

        assert!(runtime.calls().iter().any(|call| matches!(
            call,
            crate::testing::RuntimeCall::ConnectNetwork { container, .. } if container == "edge-router"
        )));
    }
}
