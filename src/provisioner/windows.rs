use super::{InstanceProvisioner, resolve_hostname};
use crate::error::{PlaygroundError, Result};
use crate::router::{HostOpts, encode_host};
use crate::storage::{Storage, StorageError};
use crate::types::{Instance, InstanceConfig, InstanceKind, PoolAllocation, PoolSlot, Session};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Restricted-OS strategy: hands out hosts from a fixed, pre-provisioned
/// pool instead of creating containers on demand.
///
/// Slot claims go through [`Storage::pool_allocation_put`], which refuses a
/// slot that is already taken, so concurrent requests never share a host.
pub struct WindowsPoolProvisioner {
    slots: Vec<PoolSlot>,
    storage: Arc<dyn Storage>,
}

impl WindowsPoolProvisioner {
    pub fn new(slots: Vec<PoolSlot>, storage: Arc<dyn Storage>) -> Self {
        Self { slots, storage }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    async fn claim_slot(&self, session: &Session) -> Result<&PoolSlot> {
        for slot in &self.slots {
            let allocation = PoolAllocation {
                slot_id: slot.id.clone(),
                session_id: session.id.clone(),
                allocated_at: Utc::now(),
            };
            match self.storage.pool_allocation_put(&allocation).await {
                Ok(()) => return Ok(slot),
                Err(StorageError::AlreadyExists { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Windows pool exhausted ({} slots) for session {}",
            self.slots.len(),
            session.id
        );
        Err(PlaygroundError::CapacityExhausted)
    }
}

#[async_trait]
impl InstanceProvisioner for WindowsPoolProvisioner {
    async fn instance_new(&self, session: &Session, config: &InstanceConfig) -> Result<Instance> {
        let hostname = resolve_hostname(self.storage.as_ref(), session, config).await?;
        let slot = self.claim_slot(session).await?;

        info!(
            "Pool host {} ({}) allocated to session {}",
            slot.id, slot.address, session.id
        );

        Ok(Instance {
            name: slot.id.clone(),
            image: String::new(),
            hostname,
            ip: slot.address.clone(),
            routable_ip: slot.address.clone(),
            session_id: session.id.clone(),
            session_host: session.host.clone(),
            proxy_host: encode_host(&session.id, &slot.address, &HostOpts::default()),
            kind: InstanceKind::Windows,
            windows_id: Some(slot.id.clone()),
        })
    }

    async fn instance_delete(&self, _session: &Session, instance: &Instance) -> Result<()> {
        let slot_id = instance.windows_id.as_deref().unwrap_or(&instance.name);

        match self.storage.pool_allocation_delete(slot_id).await {
            Ok(()) => info!("Pool host {} released", slot_id),
            Err(e) if e.is_not_found() => debug!("Pool host {} already released", slot_id),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn provisioner_type(&self) -> &'static str {
        "windows-pool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::SessionStatus;

    fn session(id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            created_at: now,
            expires_at: now,
            user_id: String::new(),
            playground_id: "foobar".to_string(),
            host: "localhost".to_string(),
            router_ip: Some("10.0.0.254".to_string()),
            image_name: None,
            status: SessionStatus::Active,
        }
    }

    fn pool(storage: Arc<dyn Storage>) -> WindowsPoolProvisioner {
        WindowsPoolProvisioner::new(
            vec![
                PoolSlot {
                    id: "win-a".to_string(),
                    address: "10.1.0.10".to_string(),
                },
                PoolSlot {
                    id: "win-b".to_string(),
                    address: "10.1.0.11".to_string(),
                },
            ],
            storage,
        )
    }

    #[tokio::test]
    async fn test_allocates_slots_until_exhausted() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let provisioner = pool(Arc::clone(&storage));
        let first_session = session("aaaabbbbcccc");
        let second_session = session("ddddeeeeffff");

        let first = provisioner
            .instance_new(&first_session, &InstanceConfig::default())
            .await
            .unwrap();
        assert_eq!(first.name, "win-a");
        assert_eq!(first.windows_id.as_deref(), Some("win-a"));
        assert_eq!(first.ip, "10.1.0.10");
        assert_eq!(first.hostname, "node1");
        assert_eq!(first.kind, InstanceKind::Windows);
        assert_eq!(first.proxy_host, "ip10-1-0-10-aaaabbbbcccc");

        let second = provisioner
            .instance_new(&second_session, &InstanceConfig::default())
            .await
            .unwrap();
        assert_eq!(second.name, "win-b");

        let exhausted = provisioner
            .instance_new(&first_session, &InstanceConfig::default())
            .await
            .unwrap_err();
        assert!(exhausted.is_out_of_capacity());

        provisioner
            .instance_delete(&first_session, &first)
            .await
            .unwrap();
        let reused = provisioner
            .instance_new(&second_session, &InstanceConfig::default())
            .await
            .unwrap();
        assert_eq!(reused.name, "win-a");
        assert_eq!(
            storage.pool_allocation_get_all().await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let provisioner = pool(storage);
        let session = session("aaaabbbbcccc");

        let instance = provisioner
            .instance_new(&session, &InstanceConfig::default())
            .await
            .unwrap();
        provisioner.instance_delete(&session, &instance).await.unwrap();
        provisioner.instance_delete(&session, &instance).await.unwrap();
    }
}
