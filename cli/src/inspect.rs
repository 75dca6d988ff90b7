//! Read-only views over a persisted index.
//!
//! Works on index-level records only: no chain source or marker index is
//! needed, so transaction bodies are never materialized.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;

use tokenindex_core::address_index::AddressIndex;
use tokenindex_core::allocator::SequentialAllocator;
use tokenindex_core::checkpoint::{CheckpointManager, RollbackCheckpoint};
use tokenindex_core::ledger::BlockLedger;
use tokenindex_core::{Address, BlockRecord, Count, Direction, Hash256, IndexerConfig, KvStore};

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub activation_height: u32,
    pub tip: Option<u32>,
    pub last_index: u32,
    pub pending_rollback: Option<RollbackCheckpoint>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct IndexedTx {
    pub hash: Hash256,
    pub index: u32,
    /// `None` when no address was attributed to the transaction.
    pub position: Option<Count>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub hash: Hash256,
    pub height: u32,
    pub pos: u32,
}

#[derive(Debug, Serialize)]
pub struct History {
    pub items: Vec<HistoryEntry>,
    pub next_cursor: Option<Hash256>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HeightRecord {
    pub height: u32,
    #[serde(flatten)]
    pub record: BlockRecord,
}

pub struct Inspector {
    allocator: SequentialAllocator,
    ledger: BlockLedger,
    addresses: AddressIndex,
    checkpoints: CheckpointManager,
    max_page_size: usize,
}

impl Inspector {
    pub fn new(store: Arc<dyn KvStore>, config: &IndexerConfig) -> Self {
        let schema = Arc::new(config.schema.clone());
        Self {
            allocator: SequentialAllocator::new(store.clone(), schema.clone()),
            ledger: BlockLedger::new(store.clone(), schema.clone(), config.activation_height),
            addresses: AddressIndex::new(store.clone(), schema.clone()),
            checkpoints: CheckpointManager::new(store, schema),
            max_page_size: config.max_page_size,
        }
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        let highest = self.ledger.highest().await?;
        Ok(StoreStatus {
            activation_height: self.ledger.activation_height(),
            tip: highest.map(|(h, _)| h),
            last_index: highest.map_or(0, |(_, r)| r.last),
            pending_rollback: self.checkpoints.load().await?,
        })
    }

    pub async fn lookup(&self, hash: &Hash256) -> Result<Option<IndexedTx>> {
        let Some(index) = self.allocator.lookup(hash).await? else {
            return Ok(None);
        };
        Ok(Some(IndexedTx {
            hash: *hash,
            index,
            position: self.addresses.reverse(hash).await?,
        }))
    }

    /// One page of `address`'s indexed history, newest first unless
    /// `oldest_first`.
    pub async fn history(
        &self,
        address: &Address,
        limit: usize,
        cursor: Option<Hash256>,
        oldest_first: bool,
    ) -> Result<History> {
        if limit == 0 || limit > self.max_page_size {
            bail!("limit must be between 1 and {}", self.max_page_size);
        }
        let cursor = match cursor {
            Some(hash) => match self.addresses.reverse(&hash).await? {
                Some(count) => Some(count),
                None => bail!("cursor {hash} is not an indexed transaction"),
            },
            None => None,
        };
        let direction = if oldest_first {
            Direction::Ascending
        } else {
            Direction::Descending
        };

        let rows = self.addresses.range_query(address, cursor, limit, direction).await?;
        let next_cursor = if rows.len() == limit {
            rows.last().map(|(_, hash)| *hash)
        } else {
            None
        };
        let items = rows
            .into_iter()
            .map(|(count, hash)| HistoryEntry {
                hash,
                height: count.height,
                pos: count.pos,
            })
            .collect();
        Ok(History { items, next_cursor })
    }

    pub async fn records(&self, from: u32, to: u32) -> Result<Vec<HeightRecord>> {
        if from > to {
            bail!("--from {from} is above --to {to}");
        }
        Ok(self
            .ledger
            .records(from, to)
            .await?
            .into_iter()
            .map(|(height, record)| HeightRecord { height, record })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenindex_core::testing::{address, block, hash, tx, Harness, TOKEN_ID};

    const GENESIS: u32 = 100;

    async fn indexed() -> (Harness, Inspector) {
        let h = Harness::new(GENESIS);
        for i in 0..3u32 {
            h.markers.mark(hash(i), TOKEN_ID);
            h.connect(&block(GENESIS + i, vec![tx(hash(i), &[], &[address(7)])]))
                .await
                .unwrap();
        }
        // Not a token transaction.
        h.connect(&block(GENESIS + 3, vec![tx(hash(99), &[], &[address(7)])]))
            .await
            .unwrap();

        let config = IndexerConfig {
            activation_height: GENESIS,
            max_page_size: 2,
            ..IndexerConfig::default()
        };
        let inspector = Inspector::new(h.store.clone(), &config);
        (h, inspector)
    }

    #[tokio::test]
    async fn status_reports_tip() {
        let (_h, inspector) = indexed().await;
        let status = inspector.status().await.unwrap();
        assert_eq!(status.tip, Some(GENESIS + 3));
        assert_eq!(status.last_index, 3);
        assert!(status.pending_rollback.is_none());
    }

    #[tokio::test]
    async fn lookup_resolves_position() {
        let (_h, inspector) = indexed().await;
        let found = inspector.lookup(&hash(1)).await.unwrap().unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(found.position, Some(Count::new(GENESIS + 1, 0)));
        assert!(inspector.lookup(&hash(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_pages_with_cursor() {
        let (_h, inspector) = indexed().await;
        let first = inspector.history(&address(7), 2, None, false).await.unwrap();
        let hashes: Vec<Hash256> = first.items.iter().map(|e| e.hash).collect();
        assert_eq!(hashes, vec![hash(2), hash(1)]);

        let second = inspector
            .history(&address(7), 2, first.next_cursor, false)
            .await
            .unwrap();
        let hashes: Vec<Hash256> = second.items.iter().map(|e| e.hash).collect();
        assert_eq!(hashes, vec![hash(0)]);
        assert!(second.next_cursor.is_none());

        let oldest = inspector.history(&address(7), 1, None, true).await.unwrap();
        assert_eq!(oldest.items[0].hash, hash(0));
    }

    #[tokio::test]
    async fn history_rejects_bad_requests() {
        let (_h, inspector) = indexed().await;
        assert!(inspector.history(&address(7), 3, None, false).await.is_err());
        assert!(inspector.history(&address(7), 0, None, false).await.is_err());
        assert!(inspector
            .history(&address(7), 1, Some(hash(42)), false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn records_in_range() {
        let (_h, inspector) = indexed().await;
        let records = inspector.records(GENESIS + 1, GENESIS + 3).await.unwrap();
        assert_eq!(
            records,
            vec![
                HeightRecord { height: GENESIS + 1, record: BlockRecord { start: 1, last: 2 } },
                HeightRecord { height: GENESIS + 2, record: BlockRecord { start: 2, last: 3 } },
                HeightRecord { height: GENESIS + 3, record: BlockRecord { start: 3, last: 3 } },
            ]
        );
        assert!(inspector.records(5, 1).await.is_err());
    }
}
