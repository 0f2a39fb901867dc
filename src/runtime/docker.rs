//! Docker runtime backend.
//!
//! Implements [`RuntimeConnection`] on top of the bollard Docker API and a
//! [`RuntimeFactory`] that lazily connects once and hands the same client
//! to every session.

use super::{
    CreateContainerOpts, NetworkCreateOpts, Result, RuntimeConnection, RuntimeError,
    RuntimeFactory,
};
use crate::env;
use crate::types::Session;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{EndpointIpamConfig, EndpointSettings, HostConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const DEFAULT_DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";

impl From<bollard::errors::Error> for RuntimeError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => RuntimeError::AlreadyExists(message),
            bollard::errors::Error::RequestTimeoutError => RuntimeError::Timeout,
            e => RuntimeError::Api(e),
        }
    }
}

/// Docker connection settings.
#[derive(Debug, Clone)]
pub struct DockerFactoryConfig {
    /// Daemon address (`unix://`, `tcp://` or `http://`); local defaults when unset
    pub daemon_url: Option<String>,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for DockerFactoryConfig {
    fn default() -> Self {
        Self {
            daemon_url: None,
            timeout: env::runtime::REQUEST_TIMEOUT_SECS,
        }
    }
}

/// A connection to one Docker daemon.
#[derive(Clone)]
pub struct DockerConnection {
    docker: Docker,
    daemon_host: String,
}

impl DockerConnection {
    /// Connect to a Docker daemon and verify it answers.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unavailable`] if the daemon cannot be reached.
    pub async fn connect(config: &DockerFactoryConfig) -> Result<Self> {
        let (docker, daemon_host) = match config.daemon_url.as_deref() {
            Some(url) if url.starts_with("unix://") => {
                debug!("Connecting to Docker socket: {}", url);
                let docker =
                    Docker::connect_with_socket(url, config.timeout, bollard::API_DEFAULT_VERSION)
                        .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
                (docker, url.to_string())
            }
            Some(url) => {
                let http_url = url.replacen("tcp://", "http://", 1);
                debug!("Connecting to Docker over HTTP: {}", http_url);
                let docker = Docker::connect_with_http(
                    &http_url,
                    config.timeout,
                    bollard::API_DEFAULT_VERSION,
                )
                .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
                (docker, url.to_string())
            }
            None => {
                debug!("Connecting to Docker via local defaults");
                let docker = Docker::connect_with_local_defaults()
                    .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
                let host = std::env::var("DOCKER_HOST")
                    .unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET.to_string());
                (docker, host)
            }
        };

        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("Failed to ping Docker: {}", e)))?;

        info!("Connected to Docker daemon at {}", daemon_host);

        Ok(Self {
            docker,
            daemon_host,
        })
    }
}

#[async_trait]
impl RuntimeConnection for DockerConnection {
    async fn create_network(&self, name: &str, opts: &NetworkCreateOpts) -> Result<()> {
        debug!("Creating network: {} ({})", name, opts.driver);

        let response = self
            .docker
            .create_network(bollard::network::CreateNetworkOptions {
                name,
                driver: opts.driver.as_str(),
                attachable: opts.attachable,
                ..Default::default()
            })
            .await?;

        info!("Created network: {} ({})", name, response.id);
        Ok(())
    }

    async fn connect_network(
        &self,
        container: &str,
        network: &str,
        requested_ip: Option<&str>,
    ) -> Result<String> {
        debug!("Connecting {} to network {}", container, network);

        let endpoint_config = EndpointSettings {
            ipam_config: requested_ip.filter(|ip| !ip.is_empty()).map(|ip| {
                EndpointIpamConfig {
                    ipv4_address: Some(ip.to_string()),
                    ..Default::default()
                }
            }),
            ..Default::default()
        };

        self.docker
            .connect_network(
                network,
                bollard::network::ConnectNetworkOptions {
                    container,
                    endpoint_config,
                },
            )
            .await?;

        let ips = self.container_ips(container).await?;
        ips.get(network).cloned().ok_or_else(|| {
            RuntimeError::Other(format!(
                "Container {} has no address on network {}",
                container, network
            ))
        })
    }

    async fn disconnect_network(&self, container: &str, network: &str) -> Result<()> {
        debug!("Disconnecting {} from network {}", container, network);

        self.docker
            .disconnect_network(
                network,
                bollard::network::DisconnectNetworkOptions {
                    container,
                    force: true,
                },
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { ref message, .. }
                    if message.contains("is not connected") =>
                {
                    RuntimeError::NotConnected {
                        container: container.to_string(),
                        network: network.to_string(),
                    }
                }
                e => RuntimeError::from(e),
            })
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        debug!("Removing network: {}", name);
        self.docker.remove_network(name).await?;
        info!("Removed network: {}", name);
        Ok(())
    }

    fn daemon_host(&self) -> String {
        self.daemon_host.clone()
    }

    async fn create_container(&self, opts: &CreateContainerOpts) -> Result<()> {
        let mut labels = HashMap::new();
        labels.insert(
            env::provisioning::SESSION_LABEL.to_string(),
            opts.session_id.clone(),
        );

        let mut container_env = vec![format!("SESSION_ID={}", opts.session_id)];
        if !opts.host_fqdn.is_empty() {
            container_env.push(format!("PWD_HOST_FQDN={}", opts.host_fqdn));
        }

        let binds = opts.tls_cert_dir.as_ref().map(|dir| {
            vec![format!(
                "{}:{}:ro",
                dir.display(),
                env::provisioning::CERTS_MOUNT_PATH
            )]
        });

        let host_config = HostConfig {
            privileged: Some(opts.privileged),
            network_mode: opts.networks.first().cloned(),
            binds,
            ..Default::default()
        };

        let config = bollard::container::Config {
            image: Some(opts.image.clone()),
            hostname: Some(opts.hostname.clone()),
            env: Some(container_env),
            labels: Some(labels),
            tty: Some(true),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        debug!("Creating container: {}", opts.container_name);

        let response = self
            .docker
            .create_container(
                Some(bollard::container::CreateContainerOptions {
                    name: opts.container_name.as_str(),
                    ..Default::default()
                }),
                config,
            )
            .await?;

        for network in opts.networks.iter().skip(1) {
            self.connect_network(&opts.container_name, network, None)
                .await?;
        }

        self.docker
            .start_container(
                &opts.container_name,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        info!(
            "Started container: {} ({})",
            opts.container_name,
            response.id.get(..12).unwrap_or(&response.id)
        );
        Ok(())
    }

    async fn container_ips(&self, name: &str) -> Result<HashMap<String, String>> {
        let inspect = self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(network, endpoint)| {
                endpoint
                    .ip_address
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| (network, ip))
            })
            .collect())
    }

    async fn delete_container(&self, name: &str) -> Result<()> {
        debug!("Removing container: {}", name);

        self.docker
            .remove_container(
                name,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;

        info!("Removed container: {}", name);
        Ok(())
    }

    async fn container_resize(&self, name: &str, rows: u16, cols: u16) -> Result<()> {
        self.docker
            .resize_container_tty(
                name,
                bollard::container::ResizeContainerTtyOptions {
                    width: cols,
                    height: rows,
                },
            )
            .await?;
        Ok(())
    }
}

/// Factory handing every session a connection to the configured daemon.
pub struct DockerFactory {
    config: DockerFactoryConfig,
    connection: OnceCell<Arc<DockerConnection>>,
}

impl DockerFactory {
    pub fn new(config: DockerFactoryConfig) -> Self {
        Self {
            config,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<Arc<DockerConnection>> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                DockerConnection::connect(&self.config).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(connection))
    }
}

#[async_trait]
impl RuntimeFactory for DockerFactory {
    async fn get_for_session(&self, session: &Session) -> Result<Arc<dyn RuntimeConnection>> {
        match self.connection().await {
            Ok(connection) => Ok(connection as Arc<dyn RuntimeConnection>),
            Err(e) => {
                warn!("No Docker backend for session {}: {}", session.id, e);
                Err(e)
            }
        }
    }
}
