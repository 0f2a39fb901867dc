//! Persistent store for playgrounds, sessions, instances and pool allocations.
//!
//! The orchestrator only relies on the [`Storage`] trait. Two backends ship
//! with the crate:
//!
//! - [`MemoryStorage`]: concurrent in-memory maps
//! - [`FileStorage`]: in-memory maps plus an atomically replaced JSON snapshot
//!
//! Atomicity the core depends on (pool slot claims) lives in the backend.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::types::{Instance, Playground, PoolAllocation, Session};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Record already exists and may not be overwritten
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Get/put/count/find operations over playground records.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn session_get(&self, id: &str) -> Result<Session>;
    async fn session_put(&self, session: &Session) -> Result<()>;
    async fn session_delete(&self, id: &str) -> Result<()>;
    async fn session_count(&self) -> Result<usize>;
    async fn session_get_all(&self) -> Result<Vec<Session>>;

    async fn instance_get(&self, name: &str) -> Result<Instance>;
    async fn instance_put(&self, instance: &Instance) -> Result<()>;
    async fn instance_delete(&self, name: &str) -> Result<()>;
    async fn instance_count(&self) -> Result<usize>;
    /// Instances of a session, ordered by name.
    async fn instance_find_by_session_id(&self, session_id: &str) -> Result<Vec<Instance>>;

    async fn playground_get(&self, id: &str) -> Result<Playground>;
    async fn playground_put(&self, playground: &Playground) -> Result<()>;
    async fn playground_get_all(&self) -> Result<Vec<Playground>>;

    async fn pool_allocation_get_all(&self) -> Result<Vec<PoolAllocation>>;
    /// Claim a pool slot.
    ///
    /// Fails with [`StorageError::AlreadyExists`] when the slot is taken.
    async fn pool_allocation_put(&self, allocation: &PoolAllocation) -> Result<()>;
    async fn pool_allocation_delete(&self, slot_id: &str) -> Result<()>;
}

/// Serializable image of every record in a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub playgrounds: Vec<Playground>,
    #[serde(default)]
    pub pool_allocations: Vec<PoolAllocation>,
}
