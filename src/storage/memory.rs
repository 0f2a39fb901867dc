use super::{Result, Storage, StorageError, StorageSnapshot};
use crate::types::{Instance, Playground, PoolAllocation, Session};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory store backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sessions: DashMap<String, Session>,
    instances: DashMap<String, Instance>,
    playgrounds: DashMap<String, Playground>,
    pool_allocations: DashMap<String, PoolAllocation>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        let storage = Self::new();
        for session in snapshot.sessions {
            storage.sessions.insert(session.id.clone(), session);
        }
        for instance in snapshot.instances {
            storage.instances.insert(instance.name.clone(), instance);
        }
        for playground in snapshot.playgrounds {
            storage.playgrounds.insert(playground.id.clone(), playground);
        }
        for allocation in snapshot.pool_allocations {
            storage
                .pool_allocations
                .insert(allocation.slot_id.clone(), allocation);
        }
        storage
    }

    /// Copy every record out, sorted by key.
    pub fn snapshot(&self) -> StorageSnapshot {
        let mut snapshot = StorageSnapshot {
            sessions: self.sessions.iter().map(|e| e.value().clone()).collect(),
            instances: self.instances.iter().map(|e| e.value().clone()).collect(),
            playgrounds: self.playgrounds.iter().map(|e| e.value().clone()).collect(),
            pool_allocations: self
                .pool_allocations
                .iter()
                .map(|e| e.value().clone())
                .collect(),
        };
        snapshot.sessions.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.instances.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot.playgrounds.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
            .pool_allocations
            .sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
        snapshot
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn session_get(&self, id: &str) -> Result<Session> {
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| StorageError::not_found("session", id))
    }

    async fn session_put(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn session_delete(&self, id: &str) -> Result<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("session", id))
    }

    async fn session_count(&self) -> Result<usize> {
        Ok(self.sessions.len())
    }

    async fn session_get_all(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn instance_get(&self, name: &str) -> Result<Instance> {
        self.instances
            .get(name)
            .map(|i| i.value().clone())
            .ok_or_else(|| StorageError::not_found("instance", name))
    }

    async fn instance_put(&self, instance: &Instance) -> Result<()> {
        self.instances
            .insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn instance_delete(&self, name: &str) -> Result<()> {
        self.instances
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("instance", name))
    }

    async fn instance_count(&self) -> Result<usize> {
        Ok(self.instances.len())
    }

    async fn instance_find_by_session_id(&self, session_id: &str) -> Result<Vec<Instance>> {
        let mut instances: Vec<Instance> = self
            .instances
            .iter()
            .filter(|e| e.value().session_id == session_id)
            .map(|e| e.value().clone())
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    async fn playground_get(&self, id: &str) -> Result<Playground> {
        self.playgrounds
            .get(id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StorageError::not_found("playground", id))
    }

    async fn playground_put(&self, playground: &Playground) -> Result<()> {
        self.playgrounds
            .insert(playground.id.clone(), playground.clone());
        Ok(())
    }

    async fn playground_get_all(&self) -> Result<Vec<Playground>> {
        let mut playgrounds: Vec<Playground> =
            self.playgrounds.iter().map(|e| e.value().clone()).collect();
        playgrounds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(playgrounds)
    }

    async fn pool_allocation_get_all(&self) -> Result<Vec<PoolAllocation>> {
        let mut allocations: Vec<PoolAllocation> = self
            .pool_allocations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        allocations.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
        Ok(allocations)
    }

    async fn pool_allocation_put(&self, allocation: &PoolAllocation) -> Result<()> {
        match self.pool_allocations.entry(allocation.slot_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                kind: "pool allocation",
                id: allocation.slot_id.clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(allocation.clone());
                Ok(())
            }
        }
    }

    async fn pool_allocation_delete(&self, slot_id: &str) -> Result<()> {
        self.pool_allocations
            .remove(slot_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("pool allocation", slot_id))
    }
}
