use super::{InstanceProvisioner, connection_for, resolve_hostname};
use crate::env;
use crate::error::{NotFoundKind, PlaygroundError, Result};
use crate::id::IdGenerator;
use crate::router::{HostOpts, encode_host};
use crate::runtime::{CreateContainerOpts, RuntimeError, RuntimeFactory};
use crate::storage::Storage;
use crate::types::{Instance, InstanceConfig, InstanceKind, Session};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings for node-in-node containers.
#[derive(Debug, Clone)]
pub struct DindConfig {
    /// Image used when neither the request nor the playground names one
    pub default_image: String,
    /// Run instance containers privileged (required by docker-in-docker)
    pub privileged: bool,
    /// Host directory with TLS material to mount into each instance
    pub tls_cert_dir: Option<PathBuf>,
}

impl Default for DindConfig {
    fn default() -> Self {
        Self {
            default_image: env::provisioning::DEFAULT_DIND_IMAGE.to_string(),
            privileged: true,
            tls_cert_dir: None,
        }
    }
}

/// Standard strategy: one privileged container per instance, attached to the
/// session network.
pub struct DindProvisioner {
    generator: Arc<dyn IdGenerator>,
    factory: Arc<dyn RuntimeFactory>,
    storage: Arc<dyn Storage>,
    config: DindConfig,
}

impl DindProvisioner {
    pub fn new(
        generator: Arc<dyn IdGenerator>,
        factory: Arc<dyn RuntimeFactory>,
        storage: Arc<dyn Storage>,
        config: DindConfig,
    ) -> Self {
        Self {
            generator,
            factory,
            storage,
            config,
        }
    }

    /// Requested image, else the playground default, else the library default.
    async fn resolve_image(&self, session: &Session, config: &InstanceConfig) -> Result<String> {
        if let Some(image) = config.requested_image() {
            return Ok(image.to_string());
        }

        let playground = self
            .storage
            .playground_get(&session.playground_id)
            .await
            .map_err(|e| {
                PlaygroundError::from_lookup(
                    e,
                    NotFoundKind::Playground(session.playground_id.clone()),
                )
            })?;

        if playground.default_dind_instance_image.is_empty() {
            Ok(self.config.default_image.clone())
        } else {
            Ok(playground.default_dind_instance_image)
        }
    }
}

#[async_trait]
impl InstanceProvisioner for DindProvisioner {
    async fn instance_new(&self, session: &Session, config: &InstanceConfig) -> Result<Instance> {
        let connection = connection_for(self.factory.as_ref(), session).await?;

        let container_name = format!("{}_{}", session.short_id(), self.generator.new_id());
        let hostname = resolve_hostname(self.storage.as_ref(), session, config).await?;
        let image = self.resolve_image(session, config).await?;

        let opts = CreateContainerOpts {
            image: image.clone(),
            session_id: session.id.clone(),
            container_name: container_name.clone(),
            hostname: hostname.clone(),
            privileged: self.config.privileged,
            host_fqdn: config.playground_fqdn.clone(),
            networks: vec![session.id.clone()],
            tls_cert_dir: self.config.tls_cert_dir.clone(),
        };

        debug!(
            "Creating instance {} ({}) in session {}",
            container_name, image, session.id
        );
        connection.create_container(&opts).await?;

        let ips = connection.container_ips(&container_name).await?;
        let ip = ips.get(&session.id).cloned().ok_or_else(|| {
            PlaygroundError::Provisioning(format!(
                "Container {} has no address on session network {}",
                container_name, session.id
            ))
        })?;

        info!(
            "Instance {} created in session {} at {}",
            container_name, session.id, ip
        );

        Ok(Instance {
            proxy_host: encode_host(&session.id, &ip, &HostOpts::default()),
            name: container_name,
            image,
            hostname,
            routable_ip: ip.clone(),
            ip,
            session_id: session.id.clone(),
            session_host: session.host.clone(),
            kind: InstanceKind::Linux,
            windows_id: None,
        })
    }

    async fn instance_delete(&self, session: &Session, instance: &Instance) -> Result<()> {
        let connection = connection_for(self.factory.as_ref(), session).await?;

        match connection.delete_container(&instance.name).await {
            Ok(()) => info!("Instance {} removed", instance.name),
            Err(RuntimeError::NotFound(_)) => {
                debug!("Instance {} already removed", instance.name)
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn provisioner_type(&self) -> &'static str {
        "dind"
    }
}
