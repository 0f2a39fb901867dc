//! Session and instance lifecycle.
//!
//! [`Orchestrator`] sequences the collaborators for every operation: policy
//! checks, runtime provisioning, persistence and event emission. It holds no
//! state of its own; everything durable lives in [`Storage`].
//!
//! A session moves `absent -> active -> closing -> absent`. Instance creation
//! re-reads the session from storage, so a close that has already started
//! turns concurrent requests into [`PlaygroundError::SessionComplete`].

use crate::error::{NotFoundKind, PlaygroundError, Result};
use crate::event::{EventKind, EventPublisher};
use crate::id::IdGenerator;
use crate::provisioner::{InstanceProvisionerFactory, SessionProvisioner, connection_for};
use crate::router::decode_host;
use crate::runtime::RuntimeFactory;
use crate::storage::Storage;
use crate::types::{Instance, InstanceConfig, Playground, Session, SessionConfig, SessionStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};


/// Coordinates playground sessions and their instances.
pub struct Orchestrator {
    factory: Arc<dyn RuntimeFactory>,
    events: Arc<dyn EventPublisher>,
    storage: Arc<dyn Storage>,
    session_provisioner: Arc<dyn SessionProvisioner>,
    instance_provisioners: InstanceProvisionerFactory,
    generator: Arc<dyn IdGenerator>,
}

impl Orchestrator {
    pub fn new(
        factory: Arc<dyn RuntimeFactory>,
        events: Arc<dyn EventPublisher>,
        storage: Arc<dyn Storage>,
        session_provisioner: Arc<dyn SessionProvisioner>,
        instance_provisioners: InstanceProvisionerFactory,
        generator: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            factory,
            events,
            storage,
            session_provisioner,
            instance_provisioners,
            generator,
        }
    }

    /// Create a session: network first, then the record, then the event.
    pub async fn session_new(&self, config: SessionConfig) -> Result<Session> {
        let playground = self.playground_get(&config.playground_id).await?;

        let duration = if config.duration.is_zero() {
            playground.default_session_duration()
        } else {
            config.duration
        };
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut session = Session {
            id: self.generator.new_id(),
            created_at: now,
            expires_at,
            user_id: config.user_id,
            playground_id: playground.id.clone(),
            host: String::new(),
            router_ip: None,
            image_name: config.image_name,
            status: SessionStatus::Active,
        };

        info!(
            "Creating session {} in playground {} (expires {})",
            session.id, playground.id, session.expires_at
        );

        if let Err(e) = self.session_provisioner.session_new(&mut session).await {
            error!("Failed to provision session {}: {}", session.id, e);
            return Err(e);
        }

        self.storage.session_put(&session).await?;
        self.events
            .emit(EventKind::SessionNew, &session.id, Vec::new());

        info!("Session {} ready on {}", session.id, session.host);
        Ok(session)
    }

    /// Create an instance inside a live session.
    pub async fn instance_new(&self, session: &Session, config: InstanceConfig) -> Result<Instance> {
        let session = match self.storage.session_get(&session.id).await {
            Ok(current) if current.is_closing() => {
                debug!("Session {} is closing, refusing new instance", current.id);
                return Err(PlaygroundError::session_complete(&current.id));
            }
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                debug!("Session {} no longer exists", session.id);
                return Err(PlaygroundError::session_complete(&session.id));
            }
            Err(e) => return Err(e.into()),
        };

        let playground = self.playground_get(&session.playground_id).await?;
        if !playground.allows(config.kind) {
            warn!(
                "Rejected {} instance in session {}: not allowed by playground {}",
                config.kind, session.id, playground.id
            );
            return Err(PlaygroundError::PolicyDenied {
                playground_id: playground.id,
                kind: config.kind,
            });
        }

        let provisioner = self.instance_provisioners.get(config.kind);
        debug!(
            "Provisioning {} instance for session {} via {}",
            config.kind,
            session.id,
            provisioner.provisioner_type()
        );
        let instance = provisioner.instance_new(&session, &config).await?;

        if let Err(e) = self.storage.instance_put(&instance).await {
            error!(
                "Instance {} was created but could not be stored: {}",
                instance.name, e
            );
            return Err(e.into());
        }

        self.events.emit(
            EventKind::InstanceNew,
            &session.id,
            vec![
                instance.name.clone(),
                instance.ip.clone(),
                instance.hostname.clone(),
                instance.proxy_host.clone(),
            ],
        );

        Ok(instance)
    }

    /// Resize the terminal of an instance's container.
    pub async fn instance_resize_terminal(&self, instance: &Instance, rows: u16, cols: u16) -> Result<()> {
        let session = self.session_get(&instance.session_id).await?;
        let connection = connection_for(self.factory.as_ref(), &session).await?;

        debug!("Resizing {} to {}x{}", instance.name, cols, rows);
        connection
            .container_resize(&instance.name, rows, cols)
            .await?;
        Ok(())
    }

    /// Remove an instance and its record. Safe to repeat.
    pub async fn instance_delete(&self, session: &Session, instance: &Instance) -> Result<()> {
        let provisioner = self.instance_provisioners.get(instance.kind);
        provisioner.instance_delete(session, instance).await?;

        match self.storage.instance_delete(&instance.name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Instance record {} already removed", instance.name)
            }
            Err(e) => return Err(e.into()),
        }

        self.events.emit(
            EventKind::InstanceDelete,
            &session.id,
            vec![instance.name.clone()],
        );
        info!("Instance {} deleted from session {}", instance.name, session.id);
        Ok(())
    }

    /// Tear a session down: instances, then network, then the record.
    ///
    /// Safe to call again on a session that is already gone; only the call
    /// that removes the record emits `session_end`.
    pub async fn session_close(&self, session: &Session) -> Result<()> {
        match self.storage.session_get(&session.id).await {
            Ok(mut current) => {
                if !current.is_closing() {
                    current.status = SessionStatus::Closing;
                    self.storage.session_put(&current).await?;
                }
            }
            Err(e) if e.is_not_found() => {
                debug!("Session {} already removed from storage", session.id)
            }
            Err(e) => return Err(e.into()),
        }

        info!("Closing session {}", session.id);

        let instances = self.storage.instance_find_by_session_id(&session.id).await?;
        for instance in &instances {
            self.instance_delete(session, instance).await?;
        }

        self.session_provisioner.session_close(session).await?;

        match self.storage.session_delete(&session.id).await {
            Ok(()) => {
                self.events
                    .emit(EventKind::SessionEnd, &session.id, Vec::new());
                info!(
                    "Session {} closed ({} instances removed)",
                    session.id,
                    instances.len()
                );
            }
            Err(e) if e.is_not_found() => {
                debug!("Session {} was already closed", session.id)
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn session_get(&self, id: &str) -> Result<Session> {
        self.storage
            .session_get(id)
            .await
            .map_err(|e| PlaygroundError::from_lookup(e, NotFoundKind::Session(id.to_string())))
    }

    pub async fn instance_get(&self, name: &str) -> Result<Instance> {
        self.storage
            .instance_get(name)
            .await
            .map_err(|e| PlaygroundError::from_lookup(e, NotFoundKind::Instance(name.to_string())))
    }

    pub async fn instance_find_by_session(&self, session_id: &str) -> Result<Vec<Instance>> {
        Ok(self.storage.instance_find_by_session_id(session_id).await?)
    }

    /// Resolve a proxy host label (as produced for [`Instance::proxy_host`])
    /// back to the instance it addresses.
    pub async fn instance_find_by_proxy_host(&self, host: &str) -> Result<Instance> {
        let not_found = || PlaygroundError::NotFound(NotFoundKind::Instance(host.to_string()));

        let decoded = decode_host(host).ok_or_else(not_found)?;
        let instances = self
            .storage
            .instance_find_by_session_id(&decoded.session_id)
            .await?;

        instances
            .into_iter()
            .find(|instance| {
                instance
                    .ip
                    .parse::<std::net::Ipv4Addr>()
                    .is_ok_and(|ip| ip == decoded.ip)
            })
            .ok_or_else(not_found)
    }

    pub async fn playground_get(&self, id: &str) -> Result<Playground> {
        self.storage.playground_get(id).await.map_err(|e| {
            PlaygroundError::from_lookup(e, NotFoundKind::Playground(id.to_string()))
        })
    }

    /// Sessions whose lifetime ended at or before `now`.
    pub async fn expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let sessions = self.storage.session_get_all().await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.is_expired(now))
            .collect())
    }
}
