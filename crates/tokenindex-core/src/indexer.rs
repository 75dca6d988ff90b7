//! Indexer configuration, state types, and the [`TokenIndexer`] facade.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::checkpoint::RollbackCheckpoint;
use crate::codec::KeySchema;
use crate::engine::IndexingEngine;
use crate::error::{IndexerError, Result};
use crate::listener::ChainListener;
use crate::query::QueryEngine;
use crate::types::{ConnectedBlock, Hash256};

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used in logs).
    pub id: String,
    /// First height that may contain the monitored token. Lower heights are
    /// never indexed.
    pub activation_height: u32,
    /// Ceiling on the page size of address listings.
    pub max_page_size: usize,
    /// Monitored token id. Required when classifying through a marker index.
    pub token_id: Option<Hash256>,
    /// Namespace bytes of the persisted layout.
    pub schema: KeySchema,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "token".into(),
            activation_height: 0,
            max_page_size: 100,
            token_id: None,
            schema: KeySchema::default(),
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(IndexerError::Config("id must not be empty".into()));
        }
        if self.max_page_size == 0 {
            return Err(IndexerError::Config("max_page_size must be at least 1".into()));
        }
        self.schema.validate()
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexerState {
    /// Nothing indexed since start.
    Idle,
    /// Following connect notifications.
    Live,
    /// Removing a disconnected height.
    Unwinding,
    /// Administrative rollback in progress; indexing suspended.
    RollingBack,
    /// Shut down by the host.
    Stopped,
    /// A write failed; the last height was not committed.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Live => write!(f, "live"),
            Self::Unwinding => write!(f, "unwinding"),
            Self::RollingBack => write!(f, "rolling-back"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of the index's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub activation_height: u32,
    /// Highest indexed height.
    pub tip: Option<u32>,
    /// Last sequential index issued.
    pub last_index: u32,
    pub state: IndexerState,
    /// Rollback target while indexing is suspended.
    pub suspended_for: Option<u32>,
    /// Persisted rollback that has not finished yet.
    pub pending_rollback: Option<RollbackCheckpoint>,
}

// ─── TokenIndexer ─────────────────────────────────────────────────────────────

/// The assembled index: indexing engine plus query engine.
///
/// Build one with [`IndexerBuilder`](crate::builder::IndexerBuilder).
pub struct TokenIndexer {
    config: IndexerConfig,
    engine: Arc<IndexingEngine>,
    query: QueryEngine,
}

impl TokenIndexer {
    pub(crate) fn new(config: IndexerConfig, engine: Arc<IndexingEngine>, query: QueryEngine) -> Self {
        Self {
            config,
            engine,
            query,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn engine(&self) -> &IndexingEngine {
        &self.engine
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    pub fn state(&self) -> IndexerState {
        self.engine.state()
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        self.engine.status().await
    }

    /// Finish any interrupted rollback. Call once at startup.
    pub async fn start(&self) -> Result<()> {
        if let Some(unwound) = self.engine.resume().await? {
            tracing::info!(id = %self.config.id, unwound, "interrupted rollback finished");
        }
        tracing::info!(
            id = %self.config.id,
            activation_height = self.config.activation_height,
            "token indexer started"
        );
        Ok(())
    }

    /// Roll the index back so that `target` is the highest indexed height.
    pub async fn rollback_to(&self, target: u32) -> Result<u32> {
        self.engine.rollback_to(target).await
    }
}

#[async_trait]
impl ChainListener for TokenIndexer {
    async fn on_block_connected(&self, block: &ConnectedBlock) -> Result<()> {
        self.engine.index_block(block).await.map(|_| ())
    }

    async fn on_block_disconnected(&self, block: &ConnectedBlock) -> Result<()> {
        self.engine.unindex_block(block.height, Some(block)).await.map(|_| ())
    }

    async fn on_reset(&self, height: u32) -> Result<()> {
        self.engine.rollback_to(height).await.map(|_| ())
    }

    fn name(&self) -> &str {
        &self.config.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{address, block, hash, tx, Harness, TOKEN_ID};

    #[test]
    fn config_defaults() {
        let cfg = IndexerConfig::default();
        assert_eq!(cfg.max_page_size, 100);
        assert_eq!(cfg.schema, KeySchema::default());
        cfg.validate().unwrap();
    }

    #[test]
    fn config_from_partial_json() {
        let cfg: IndexerConfig = serde_json::from_value(serde_json::json!({
            "activation_height": 866600,
            "token_id": "7e".repeat(32),
        }))
        .unwrap();
        assert_eq!(cfg.activation_height, 866_600);
        assert_eq!(cfg.token_id, Some(TOKEN_ID));
        assert_eq!(cfg.max_page_size, 100);
        assert_eq!(cfg.schema.address, b'M');
    }

    #[test]
    fn config_rejects_zero_page_size() {
        let cfg = IndexerConfig {
            max_page_size: 0,
            ..IndexerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(IndexerError::Config(_))));
    }

    #[test]
    fn state_display() {
        assert_eq!(IndexerState::RollingBack.to_string(), "rolling-back");
        assert_eq!(IndexerState::Live.to_string(), "live");
    }

    #[tokio::test]
    async fn listener_drives_engine() {
        let h = Harness::new(10);
        h.markers.mark(hash(1), TOKEN_ID);
        let b = block(10, vec![tx(hash(1), &[], &[address(1)])]);
        h.chain.insert_block(&b);

        h.indexer.start().await.unwrap();
        h.indexer.on_block_connected(&b).await.unwrap();
        let status = h.indexer.status().await.unwrap();
        assert_eq!(status.tip, Some(10));
        assert_eq!(status.last_index, 1);
        assert_eq!(status.state, IndexerState::Live);

        h.indexer.on_block_disconnected(&b).await.unwrap();
        let status = h.indexer.status().await.unwrap();
        assert_eq!(status.tip, None);
        assert!(h.store.is_empty().unwrap());
    }
}
