use super::{SessionProvisioner, connection_for};
use crate::env;
use crate::error::Result;
use crate::runtime::{NetworkCreateOpts, RuntimeError, RuntimeFactory, daemon_hostname};
use crate::types::Session;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Gives every session its own attachable overlay network named after the
/// session id, with the shared router container connected to it.
///
/// A failure between network creation and router attachment leaves the
/// network behind; [`SessionProvisioner::session_close`] removes it.
pub struct OverlaySessionProvisioner {
    factory: Arc<dyn RuntimeFactory>,
    router_name: String,
    network_opts: NetworkCreateOpts,
}

impl OverlaySessionProvisioner {
    pub fn new(factory: Arc<dyn RuntimeFactory>) -> Self {
        Self {
            factory,
            router_name: env::runtime::ROUTER_CONTAINER_NAME.to_string(),
            network_opts: NetworkCreateOpts::default(),
        }
    }

    /// Use a different router container.
    pub fn with_router_name(mut self, name: impl Into<String>) -> Self {
        self.router_name = name.into();
        self
    }

    /// Use a different network driver (e.g. `bridge` on a single host).
    pub fn with_network_driver(mut self, driver: impl Into<String>) -> Self {
        self.network_opts.driver = driver.into();
        self
    }

    pub fn router_name(&self) -> &str {
        &self.router_name
    }
}

#[async_trait]
impl SessionProvisioner for OverlaySessionProvisioner {
    async fn session_new(&self, session: &mut Session) -> Result<()> {
        let connection = connection_for(self.factory.as_ref(), session).await?;

        session.host = daemon_hostname(&connection.daemon_host());

        if let Err(e) = connection
            .create_network(&session.id, &self.network_opts)
            .await
        {
            error!("Failed to create network for session {}: {}", session.id, e);
            return Err(e.into());
        }
        info!("Network [{}] created", session.id);

        let ip = connection
            .connect_network(&self.router_name, &session.id, session.router_ip.as_deref())
            .await
            .map_err(|e| {
                error!(
                    "Failed to connect {} to network [{}]: {}",
                    self.router_name, session.id, e
                );
                e
            })?;
        info!(
            "Connected {} to network [{}] at {}",
            self.router_name, session.id, ip
        );

        session.router_ip = Some(ip);
        Ok(())
    }

    async fn session_close(&self, session: &Session) -> Result<()> {
        let connection = connection_for(self.factory.as_ref(), session).await?;

        match connection
            .disconnect_network(&self.router_name, &session.id)
            .await
        {
            Ok(()) => info!(
                "Disconnected {} from network [{}]",
                self.router_name, session.id
            ),
            Err(RuntimeError::NotConnected { .. }) | Err(RuntimeError::NotFound(_)) => debug!(
                "{} already detached from network [{}]",
                self.router_name, session.id
            ),
            Err(e) => {
                error!("Failed to disconnect network [{}]: {}", session.id, e);
                return Err(e.into());
            }
        }

        match connection.delete_network(&session.id).await {
            Ok(()) => info!("Network [{}] removed", session.id),
            Err(RuntimeError::NotFound(_)) => debug!("Network [{}] already removed", session.id),
            Err(e) => {
                error!("Failed to remove network [{}]: {}", session.id, e);
                return Err(e.into());
            }
        }

        Ok(())
    }
}
