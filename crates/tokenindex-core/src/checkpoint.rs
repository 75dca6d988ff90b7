//! Rollback checkpoint: persists an in-flight administrative rollback so it can
//! be finished after a crash.
//!
//! The checkpoint is written before the first height is unwound and removed
//! in the same batch that unwinds the last one. On restart, a present
//! checkpoint means the index may sit anywhere between the original tip and
//! `target`, and [`IndexingEngine::resume`](crate::engine::IndexingEngine::resume)
//! must run before forward indexing continues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec::KeySchema;
use crate::error::{IndexerError, Result};
use crate::store::{KvStore, WriteBatch};

const ROLLBACK_KEY: &str = "rollback";

/// A persisted, unfinished rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackCheckpoint {
    /// Height the index is being rolled back to (kept).
    pub target: u32,
    /// Unix timestamp of when the rollback started.
    pub started_at: i64,
}

/// Reads and writes the rollback checkpoint under the metadata namespace.
pub struct CheckpointManager {
    store: Arc<dyn KvStore>,
    schema: Arc<KeySchema>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn KvStore>, schema: Arc<KeySchema>) -> Self {
        Self { store, schema }
    }

    /// Load the unfinished rollback, if any.
    pub async fn load(&self) -> Result<Option<RollbackCheckpoint>> {
        let Some(raw) = self.store.get(&self.key()).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| IndexerError::malformed("rollback checkpoint", e.to_string()))
    }

    /// Persist a checkpoint for a rollback to `target`, replacing any other.
    pub async fn save(&self, target: u32) -> Result<RollbackCheckpoint> {
        let cp = RollbackCheckpoint {
            target,
            started_at: chrono::Utc::now().timestamp(),
        };
        let raw = serde_json::to_vec(&cp).map_err(|e| IndexerError::Storage(e.to_string()))?;
        let mut batch = WriteBatch::new();
        batch.put(self.key(), raw);
        self.store.write(batch).await?;
        tracing::debug!(target_height = target, "rollback checkpoint saved");
        Ok(cp)
    }

    /// Queue removal of the checkpoint into `batch`.
    pub fn clear(&self, batch: &mut WriteBatch) {
        batch.delete(self.key());
    }

    /// Remove the checkpoint immediately.
    pub async fn clear_now(&self) -> Result<()> {
        let mut batch = WriteBatch::new();
        self.clear(&mut batch);
        self.store.write(batch).await
    }

    fn key(&self) -> Vec<u8> {
        self.schema.meta_key(ROLLBACK_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, CheckpointManager) {
        let store = Arc::new(MemoryStore::new());
        let mgr = CheckpointManager::new(store.clone(), Arc::new(KeySchema::default()));
        (store, mgr)
    }

    #[tokio::test]
    async fn save_load_clear() {
        let (store, mgr) = manager();
        assert!(mgr.load().await.unwrap().is_none());

        let saved = mgr.save(866_600).await.unwrap();
        let loaded = mgr.load().await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.target, 866_600);
        assert!(loaded.started_at > 0);

        mgr.clear_now().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_malformed() {
        let (store, mgr) = manager();
        let mut batch = WriteBatch::new();
        batch.put(KeySchema::default().meta_key("rollback"), b"not json".to_vec());
        store.write(batch).await.unwrap();

        let err = mgr.load().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
