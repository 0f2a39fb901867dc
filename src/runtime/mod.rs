//! Container runtime capability layer.
//!
//! The orchestrator and provisioners never talk to a container daemon
//! directly. They obtain a [`RuntimeConnection`] for a session from a
//! [`RuntimeFactory`] and call the narrow set of operations below.
//!
//! - [`RuntimeFactory`]: resolves the backend serving a session
//! - [`RuntimeConnection`]: network and container operations on that backend
//! - [`docker`]: bollard-backed implementation (feature `docker`)
//!
//! Errors are classified where they originate: adapters report a missing
//! object as [`RuntimeError::NotFound`] and a detached endpoint as
//! [`RuntimeError::NotConnected`], so teardown paths can match on variants.

#[cfg(feature = "docker")]
pub mod docker;

use crate::types::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "docker")]
pub use docker::{DockerConnection, DockerFactory, DockerFactoryConfig};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No backend could be reached for the session
    #[error("No runtime backend available: {0}")]
    Unavailable(String),

    /// Network or container does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Endpoint is not attached to the network
    #[error("Container {container} is not connected to network {network}")]
    NotConnected { container: String, network: String },

    /// Network or container already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request exceeded the runtime client's deadline
    #[error("Runtime request timed out")]
    Timeout,

    /// Docker API error
    #[cfg(feature = "docker")]
    #[error("Docker API error: {0}")]
    Api(bollard::errors::Error),

    /// General error
    #[error("Runtime error: {0}")]
    Other(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Options for a per-session network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCreateOpts {
    pub driver: String,
    pub attachable: bool,
}

impl Default for NetworkCreateOpts {
    fn default() -> Self {
        Self {
            driver: crate::env::runtime::SESSION_NETWORK_DRIVER.to_string(),
            attachable: true,
        }
    }
}

/// Everything a runtime needs to create an instance container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateContainerOpts {
    pub image: String,
    pub session_id: String,
    pub container_name: String,
    pub hostname: String,
    pub privileged: bool,
    pub host_fqdn: String,
    /// Networks to attach; the first one is the primary network
    pub networks: Vec<String>,
    /// Host directory with TLS material mounted read-only into the container
    pub tls_cert_dir: Option<PathBuf>,
}

/// Operations on one container runtime backend.
#[async_trait]
pub trait RuntimeConnection: Send + Sync {
    /// Create a network.
    async fn create_network(&self, name: &str, opts: &NetworkCreateOpts) -> Result<()>;

    /// Attach `container` to `network`, optionally pinning its address.
    ///
    /// Returns the address the runtime assigned on that network.
    async fn connect_network(
        &self,
        container: &str,
        network: &str,
        requested_ip: Option<&str>,
    ) -> Result<String>;

    /// Detach `container` from `network`.
    async fn disconnect_network(&self, container: &str, network: &str) -> Result<()>;

    /// Remove a network.
    async fn delete_network(&self, name: &str) -> Result<()>;

    /// Address of the daemon this connection talks to, as a URL or bare host.
    fn daemon_host(&self) -> String;

    /// Create and start a container.
    async fn create_container(&self, opts: &CreateContainerOpts) -> Result<()>;

    /// Addresses of a container keyed by network name.
    async fn container_ips(&self, name: &str) -> Result<HashMap<String, String>>;

    /// Force-remove a container and its anonymous volumes.
    async fn delete_container(&self, name: &str) -> Result<()>;

    /// Resize the container's TTY.
    async fn container_resize(&self, name: &str, rows: u16, cols: u16) -> Result<()>;
}

/// Resolves the runtime backend serving a session.
///
/// Repeated calls for the same session must return a connection to the
/// same backend.
#[async_trait]
pub trait RuntimeFactory: Send + Sync {
    async fn get_for_session(&self, session: &Session) -> Result<Arc<dyn RuntimeConnection>>;
}

/// Hostname part of a daemon address, without port.
///
/// Unix sockets, bare names that do not parse as URLs and URLs without a
/// host all resolve to `localhost`.
pub fn daemon_hostname(daemon_host: &str) -> String {
    url::Url::parse(daemon_host)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_matches(['[', ']']).to_string()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| crate::env::runtime::LOCAL_DAEMON_HOST.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_hostname() {
        assert_eq!(daemon_hostname("localhost"), "localhost");
        assert_eq!(daemon_hostname("unix:///var/run/docker.sock"), "localhost");
        assert_eq!(daemon_hostname("tcp://10.0.0.5:2375"), "10.0.0.5");
        assert_eq!(daemon_hostname("http://docker-7.internal:2376"), "docker-7.internal");
        assert_eq!(daemon_hostname(""), "localhost");
    }

    #[test]
    fn test_network_create_opts_default() {
        let opts = NetworkCreateOpts::default();
        assert_eq!(opts.driver, "overlay");
        assert!(opts.attachable);
    }
}
