//! Session network and instance provisioning.
//!
//! - [`SessionProvisioner`] / [`OverlaySessionProvisioner`]: per-session overlay
//!   network with the shared router attached
//! - [`InstanceProvisioner`]: create/delete strategy for one instance type
//! - [`DindProvisioner`]: standard node-in-node containers
//! - [`WindowsPoolProvisioner`]: fixed pool of pre-provisioned hosts
//! - [`InstanceProvisionerFactory`]: picks the strategy for an [`InstanceKind`]
//!
//! Strategies never see policy-denied requests; the orchestrator checks the
//! playground before asking the factory.

mod dind;
mod overlay;
mod windows;

pub use dind::{DindConfig, DindProvisioner};
pub use overlay::OverlaySessionProvisioner;
pub use windows::WindowsPoolProvisioner;

use crate::env;
use crate::error::{PlaygroundError, Result};
use crate::runtime::{RuntimeConnection, RuntimeFactory};
use crate::storage::Storage;
use crate::types::{Instance, InstanceConfig, InstanceKind, Session};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Sets up and tears down the networking of a session.
#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    /// Create the session network and attach the router, recording the
    /// serving host and router address on `session`.
    async fn session_new(&self, session: &mut Session) -> Result<()>;

    /// Detach the router and remove the session network. Idempotent.
    async fn session_close(&self, session: &Session) -> Result<()>;
}

/// Creates and deletes instances of one type inside a session.
#[async_trait]
pub trait InstanceProvisioner: Send + Sync {
    async fn instance_new(&self, session: &Session, config: &InstanceConfig) -> Result<Instance>;

    /// Release the instance's backing resources. Idempotent.
    async fn instance_delete(&self, session: &Session, instance: &Instance) -> Result<()>;

    /// Short strategy name for logs.
    fn provisioner_type(&self) -> &'static str;
}

/// Maps instance types to provisioning strategies.
///
/// Built once at startup; performs no I/O.
#[derive(Clone)]
pub struct InstanceProvisionerFactory {
    windows: Arc<dyn InstanceProvisioner>,
    dind: Arc<dyn InstanceProvisioner>,
}

impl InstanceProvisionerFactory {
    pub fn new(windows: Arc<dyn InstanceProvisioner>, dind: Arc<dyn InstanceProvisioner>) -> Self {
        Self { windows, dind }
    }

    pub fn get(&self, kind: InstanceKind) -> Arc<dyn InstanceProvisioner> {
        match kind {
            InstanceKind::Windows => Arc::clone(&self.windows),
            InstanceKind::Linux => Arc::clone(&self.dind),
        }
    }
}

/// Obtain the runtime connection for a session.
///
/// Failing to get one means no backend slot is free, whatever the cause.
pub(crate) async fn connection_for(
    factory: &dyn RuntimeFactory,
    session: &Session,
) -> Result<Arc<dyn RuntimeConnection>> {
    factory.get_for_session(session).await.map_err(|e| {
        warn!("No runtime connection for session {}: {}", session.id, e);
        PlaygroundError::CapacityExhausted
    })
}

/// Hostname for a new instance: the requested one, else `node<N>` where N is
/// one more than the number of instances already in the session.
pub(crate) async fn resolve_hostname(
    storage: &dyn Storage,
    session: &Session,
    config: &InstanceConfig,
) -> Result<String> {
    if let Some(hostname) = config.requested_hostname() {
        return Ok(hostname.to_string());
    }
    let existing = storage.instance_find_by_session_id(&session.id).await?;
    Ok(format!(
        "{}{}",
        env::provisioning::HOSTNAME_PREFIX,
        existing.len() + 1
    ))
}
