use super::{MemoryStorage, Result, Storage, StorageSnapshot};
use crate::types::{Instance, Playground, PoolAllocation, Session};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// In-memory store that rewrites a JSON snapshot after every mutation.
///
/// The snapshot is written to a temporary sibling file and renamed over the
/// previous one, so a crash never leaves a truncated file behind.
pub struct FileStorage {
    path: PathBuf,
    inner: MemoryStorage,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open a store at `path`, loading the snapshot if one exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = if async_fs::try_exists(&path).await? {
            let content = async_fs::read(&path).await?;
            let snapshot: StorageSnapshot = serde_json::from_slice(&content)?;
            info!(
                "Loaded {} sessions and {} instances from {:?}",
                snapshot.sessions.len(),
                snapshot.instances.len(),
                path
            );
            snapshot
        } else {
            debug!("No snapshot at {:?}, starting empty", path);
            StorageSnapshot::default()
        };

        Ok(Self {
            path,
            inner: MemoryStorage::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let content = serde_json::to_vec_pretty(&self.inner.snapshot())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = async_fs::File::create(&temp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        async_fs::rename(&temp_path, &self.path).await?;
        debug!("Snapshot written: {:?} ({} bytes)", self.path, content.len());
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn session_get(&self, id: &str) -> Result<Session> {
        self.inner.session_get(id).await
    }

    async fn session_put(&self, session: &Session) -> Result<()> {
        self.inner.session_put(session).await?;
        self.flush().await
    }

    async fn session_delete(&self, id: &str) -> Result<()> {
        self.inner.session_delete(id).await?;
        self.flush().await
    }

    async fn session_count(&self) -> Result<usize> {
        self.inner.session_count().await
    }

    async fn session_get_all(&self) -> Result<Vec<Session>> {
        self.inner.session_get_all().await
    }

    async fn instance_get(&self, name: &str) -> Result<Instance> {
        self.inner.instance_get(name).await
    }

    async fn instance_put(&self, instance: &Instance) -> Result<()> {
        self.inner.instance_put(instance).await?;
        self.flush().await
    }

    async fn instance_delete(&self, name: &str) -> Result<()> {
        self.inner.instance_delete(name).await?;
        self.flush().await
    }

    async fn instance_count(&self) -> Result<usize> {
        self.inner.instance_count().await
    }

    async fn instance_find_by_session_id(&self, session_id: &str) -> Result<Vec<Instance>> {
        self.inner.instance_find_by_session_id(session_id).await
    }

    async fn playground_get(&self, id: &str) -> Result<Playground> {
        self.inner.playground_get(id).await
    }

    async fn playground_put(&self, playground: &Playground) -> Result<()> {
        self.inner.playground_put(playground).await?;
        self.flush().await
    }

    async fn playground_get_all(&self) -> Result<Vec<Playground>> {
        self.inner.playground_get_all().await
    }

    async fn pool_allocation_get_all(&self) -> Result<Vec<PoolAllocation>> {
        self.inner.pool_allocation_get_all().await
    }

    async fn pool_allocation_put(&self, allocation: &PoolAllocation) -> Result<()> {
        self.inner.pool_allocation_put(allocation).await?;
        self.flush().await
    }

    async fn pool_allocation_delete(&self, slot_id: &str) -> Result<()> {
        self.inner.pool_allocation_delete(slot_id).await?;
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    fn session(id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            created_at: now,
            expires_at: now,
            user_id: "user-1".to_string(),
            playground_id: "foobar".to_string(),
            host: "localhost".to_string(),
            router_ip: Some("10.0.0.1".to_string()),
            image_name: None,
            status: SessionStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("dockyard.json");
        let kept = session("aaaabbbbcccc");

        {
            let storage = FileStorage::open(&path).await.unwrap();
            storage.playground_put(&Playground::new("foobar")).await.unwrap();
            storage.session_put(&kept).await.unwrap();
            storage.session_put(&session("ddddeeeeffff")).await.unwrap();
            storage.session_delete("ddddeeeeffff").await.unwrap();
        }

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.session_count().await.unwrap(), 1);
        assert_eq!(reopened.session_get("aaaabbbbcccc").await.unwrap(), kept);
        assert!(reopened.playground_get("foobar").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path().join("missing.json"))
            .await
            .unwrap();
        assert_eq!(storage.session_count().await.unwrap(), 0);
        assert!(storage.playground_get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dockyard.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(matches!(
            FileStorage::open(&path).await,
            Err(crate::storage::StorageError::Serialization(_))
        ));
    }
}
