//! Indexing engine: forward indexing and rollback of whole heights.
//!
//! Every height is applied or removed as one [`WriteBatch`], so readers see
//! either all of a height's rows or none of them. Writes are serialized by a
//! single writer lock. While an administrative rollback runs, indexing is
//! suspended and both forward indexing and reorg unwinds are refused.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::address_index::AddressIndex;
use crate::allocator::SequentialAllocator;
use crate::checkpoint::{CheckpointManager, RollbackCheckpoint};
use crate::classifier::Classifier;
use crate::codec::KeySchema;
use crate::error::{IndexerError, Result};
use crate::indexer::{IndexStatus, IndexerState};
use crate::ledger::BlockLedger;
use crate::source::ChainSource;
use crate::store::{KvStore, WriteBatch};
use crate::types::{Address, BlockRecord, CoinView, ConnectedBlock, Count, Hash256, Transaction};

pub struct IndexingEngine {
    store: Arc<dyn KvStore>,
    allocator: SequentialAllocator,
    ledger: BlockLedger,
    addresses: AddressIndex,
    checkpoints: CheckpointManager,
    classifier: Arc<dyn Classifier>,
    chain: Arc<dyn ChainSource>,
    writer: Mutex<()>,
    /// Serializes the implicit resume of the first writes after a restart.
    resuming: Mutex<()>,
    suspended: AtomicBool,
    suspend_target: AtomicU32,
    /// Set until a persisted rollback checkpoint has been looked for.
    needs_resume: AtomicBool,
    state: watch::Sender<IndexerState>,
}

impl IndexingEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        schema: Arc<KeySchema>,
        classifier: Arc<dyn Classifier>,
        chain: Arc<dyn ChainSource>,
        activation_height: u32,
    ) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);
        Self {
            allocator: SequentialAllocator::new(store.clone(), schema.clone()),
            ledger: BlockLedger::new(store.clone(), schema.clone(), activation_height),
            addresses: AddressIndex::new(store.clone(), schema.clone()),
            checkpoints: CheckpointManager::new(store.clone(), schema),
            store,
            classifier,
            chain,
            writer: Mutex::new(()),
            resuming: Mutex::new(()),
            suspended: AtomicBool::new(false),
            suspend_target: AtomicU32::new(0),
            needs_resume: AtomicBool::new(true),
            state,
        }
    }

    pub fn allocator(&self) -> &SequentialAllocator {
        &self.allocator
    }

    pub fn ledger(&self) -> &BlockLedger {
        &self.ledger
    }

    pub fn addresses(&self) -> &AddressIndex {
        &self.addresses
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    /// Target height of the running rollback, if indexing is suspended.
    pub fn suspended_for(&self) -> Option<u32> {
        self.suspended
            .load(Ordering::SeqCst)
            .then(|| self.suspend_target.load(Ordering::SeqCst))
    }

    // ─── Forward path ────────────────────────────────────────────────────────

    /// Index every relevant transaction of `block` in one atomic batch.
    ///
    /// Returns the committed record, or `None` when the height is below the
    /// activation height or was already indexed.
    pub async fn index_block(&self, block: &ConnectedBlock) -> Result<Option<BlockRecord>> {
        self.check_suspended()?;
        self.resume_if_needed().await?;
        let _writer = self.writer.lock().await;
        self.check_suspended()?;

        let height = block.height;
        let Some(mut record) = self.ledger.begin_block(height).await? else {
            tracing::trace!(height, "below activation height, skipped");
            return Ok(None);
        };
        if let Some(existing) = self.ledger.get(height).await? {
            tracing::warn!(
                height,
                start = existing.start,
                last = existing.last,
                "height already indexed, skipped"
            );
            return Ok(None);
        }

        let mut batch = WriteBatch::new();
        let mut relevant = 0usize;
        let result = async {
            for (pos, tx) in block.transactions.iter().enumerate() {
                let pos = position(pos)?;
                if self.index_tx(height, pos, tx, &block.view, &mut record, &mut batch).await? {
                    relevant += 1;
                }
            }
            self.ledger.end_block(height, &record, &mut batch);
            self.store.write(batch).await
        }
        .await;
        self.observe(result)?;

        tracing::info!(
            height,
            relevant,
            start = record.start,
            last = record.last,
            "block indexed"
        );
        self.set_state(IndexerState::Live);
        Ok(Some(record))
    }

    async fn index_tx(
        &self,
        height: u32,
        pos: u32,
        tx: &Transaction,
        view: &CoinView,
        record: &mut BlockRecord,
        batch: &mut WriteBatch,
    ) -> Result<bool> {
        if !self.classifier.classify(tx).await?.is_relevant() {
            return Ok(false);
        }
        let index = self.allocator.allocate(&tx.hash, record, batch).await?;
        if index <= record.start {
            // Reused from an earlier height, which owns the address rows.
            tracing::debug!(tx = %tx.hash, index, height, pos, "index reused, address rows kept");
            return Ok(true);
        }
        let count = Count::new(height, pos);
        let addresses = self.classifier.resolve_addresses(tx, view).await?;
        for address in &addresses {
            self.addresses.put(address, count, batch);
        }
        if !addresses.is_empty() {
            self.addresses.put_forward(count, &tx.hash, batch);
            self.addresses.put_reverse(&tx.hash, count, batch);
        }
        tracing::debug!(tx = %tx.hash, index, height, pos, addresses = addresses.len(), "tx indexed");
        Ok(true)
    }

    // ─── Rollback ────────────────────────────────────────────────────────────

    /// Remove everything `height` introduced, as a reorg unwind.
    ///
    /// `block` is the disconnected block when the host has it; otherwise
    /// transaction bodies are fetched from the chain source. Unwinding a
    /// height that has no record is a no-op.
    pub async fn unindex_block(
        &self,
        height: u32,
        block: Option<&ConnectedBlock>,
    ) -> Result<Option<BlockRecord>> {
        self.check_suspended()?;
        self.resume_if_needed().await?;
        let _writer = self.writer.lock().await;
        self.check_suspended()?;

        self.set_state(IndexerState::Unwinding);
        let mut batch = WriteBatch::new();
        let result = async {
            let record = self.unindex_height(height, block, &mut batch).await?;
            if record.is_some() {
                self.store.write(batch).await?;
            }
            Ok::<_, IndexerError>(record)
        }
        .await;
        let record = self.observe(result)?;
        if let Some(r) = &record {
            tracing::warn!(height, start = r.start, last = r.last, "block unindexed");
        }
        self.set_state(IndexerState::Live);
        Ok(record)
    }

    /// Unwind every height above `target`, highest first.
    ///
    /// Indexing stays suspended for the duration. Progress is checkpointed so
    /// an interrupted rollback is finished by [`resume`](Self::resume).
    /// Returns the number of heights unwound.
    pub async fn rollback_to(&self, target: u32) -> Result<u32> {
        let _suspension = self.suspend(target)?;
        let _writer = self.writer.lock().await;
        self.needs_resume.store(true, Ordering::SeqCst);
        let cp = self.checkpoints.save(target).await?;
        let unwound = self.run_rollback(&cp).await?;
        self.needs_resume.store(false, Ordering::SeqCst);
        Ok(unwound)
    }

    /// Finish a rollback interrupted by a crash, if one was checkpointed.
    pub async fn resume(&self) -> Result<Option<u32>> {
        let Some(cp) = self.checkpoints.load().await? else {
            self.needs_resume.store(false, Ordering::SeqCst);
            return Ok(None);
        };
        let _suspension = self.suspend(cp.target)?;
        let _writer = self.writer.lock().await;
        tracing::warn!(
            target_height = cp.target,
            started_at = cp.started_at,
            "resuming interrupted rollback"
        );
        let unwound = self.run_rollback(&cp).await?;
        self.needs_resume.store(false, Ordering::SeqCst);
        Ok(Some(unwound))
    }

    async fn run_rollback(&self, cp: &RollbackCheckpoint) -> Result<u32> {
        self.set_state(IndexerState::RollingBack);
        tracing::warn!(target_height = cp.target, "rollback started, indexing suspended");

        let result = async {
            let mut unwound = 0u32;
            let mut cleared = false;
            while let Some((height, _)) = self.ledger.highest().await? {
                if height <= cp.target {
                    break;
                }
                let mut batch = WriteBatch::new();
                self.unindex_height(height, None, &mut batch).await?;
                let last = match self.ledger.highest_below(height).await? {
                    Some((below, _)) => below <= cp.target,
                    None => true,
                };
                if last {
                    self.checkpoints.clear(&mut batch);
                    cleared = true;
                }
                self.store.write(batch).await?;
                unwound += 1;
                tracing::debug!(height, target_height = cp.target, "height rolled back");
                if last {
                    break;
                }
            }
            if !cleared {
                self.checkpoints.clear_now().await?;
            }
            Ok::<_, IndexerError>(unwound)
        }
        .await;
        let unwound = self.observe(result)?;

        tracing::warn!(target_height = cp.target, unwound, "rollback complete, indexing resumed");
        self.set_state(IndexerState::Live);
        Ok(unwound)
    }

    /// Queue removal of everything `height` introduced. Caller holds the
    /// writer lock and writes the batch.
    async fn unindex_height(
        &self,
        height: u32,
        block: Option<&ConnectedBlock>,
        batch: &mut WriteBatch,
    ) -> Result<Option<BlockRecord>> {
        let Some(record) = self.ledger.get(height).await? else {
            tracing::debug!(height, "no block record, nothing to unindex");
            return Ok(None);
        };

        for index in record.introduced() {
            let hash = self.allocator.hash_at(index).await?.ok_or_else(|| {
                IndexerError::malformed(
                    "index->hash",
                    format!("no hash for index {index} introduced at height {height}"),
                )
            })?;
            self.allocator.release(&hash, index, batch);

            // No reverse row means no address was attributed at index time.
            let Some(count) = self.addresses.reverse(&hash).await? else {
                continue;
            };
            if count.height != height {
                tracing::warn!(%hash, height, indexed_at = count.height, "reverse row belongs to another height");
                continue;
            }

            let addresses = self.addresses_for(&hash, count, block).await?;
            for address in &addresses {
                self.addresses.delete(address, count, batch);
            }
            self.addresses.delete_forward(count, batch);
            self.addresses.delete_reverse(&hash, batch);
        }

        self.ledger.remove(height, batch);
        Ok(Some(record))
    }

    /// Re-derive the addresses attributed to `hash` when it was indexed.
    async fn addresses_for(
        &self,
        hash: &Hash256,
        count: Count,
        block: Option<&ConnectedBlock>,
    ) -> Result<Vec<Address>> {
        if let Some(block) = block.filter(|b| b.height == count.height) {
            let tx = block
                .transactions
                .get(count.pos as usize)
                .filter(|tx| tx.hash == *hash)
                .or_else(|| block.position_of(hash).map(|(_, tx)| tx));
            if let Some(tx) = tx {
                return self.classifier.resolve_addresses(tx, &block.view).await;
            }
        }
        let view = self.chain.transaction(hash).await?.ok_or_else(|| {
            IndexerError::MissingCollaboratorData(format!(
                "transaction {hash} (height {}) not available from chain source",
                count.height
            ))
        })?;
        self.classifier.resolve_addresses(&view.tx, &view.coins).await
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<IndexStatus> {
        let highest = self.ledger.highest().await?;
        Ok(IndexStatus {
            activation_height: self.ledger.activation_height(),
            tip: highest.map(|(h, _)| h),
            last_index: highest.map_or(0, |(_, r)| r.last),
            state: self.state(),
            suspended_for: self.suspended_for(),
            pending_rollback: self.checkpoints.load().await?,
        })
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn resume_if_needed(&self) -> Result<()> {
        if !self.needs_resume.load(Ordering::SeqCst) {
            return Ok(());
        }
        let _resuming = self.resuming.lock().await;
        // Another write may have finished the resume while this one waited.
        if self.needs_resume.load(Ordering::SeqCst) {
            self.resume().await?;
        }
        Ok(())
    }

    fn check_suspended(&self) -> Result<()> {
        match self.suspended_for() {
            Some(target) => Err(IndexerError::Suspended { target }),
            None => Ok(()),
        }
    }

    fn suspend(&self, target: u32) -> Result<Suspension<'_>> {
        if self
            .suspended
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexerError::Suspended {
                target: self.suspend_target.load(Ordering::SeqCst),
            });
        }
        self.suspend_target.store(target, Ordering::SeqCst);
        Ok(Suspension {
            flag: &self.suspended,
        })
    }

    fn set_state(&self, state: IndexerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "state changed");
        }
    }

    /// Record a failed write path in the runtime state before returning it.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!(error = %e, "index write aborted, batch discarded");
            if !e.is_recoverable() {
                self.set_state(IndexerState::Error);
            }
        }
        result
    }
}

/// Clears the suspension flag when the rollback ends, successful or not.
struct Suspension<'a> {
    flag: &'a AtomicBool,
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn position(pos: usize) -> Result<u32> {
    u32::try_from(pos).map_err(|_| IndexerError::InvalidInput(format!("block position {pos} exceeds u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{address, block, block_spending, hash, spend, tx, Harness, TOKEN_ID};

    const GENESIS: u32 = 866_600;

    /// Worked example: block at the activation height where tx #1 and #2
    /// carry the token.
    async fn activation_block(h: &Harness) -> ConnectedBlock {
        let b = block(
            GENESIS,
            vec![
                tx(hash(10), &[], &[address(1)]),
                tx(hash(11), &[], &[address(1), address(2)]),
                tx(hash(12), &[], &[address(2)]),
            ],
        );
        h.markers.mark(hash(11), TOKEN_ID);
        h.markers.mark(hash(12), TOKEN_ID);
        b
    }

    #[tokio::test]
    async fn indexes_activation_block() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        let record = h.connect(&b).await.unwrap().unwrap();
        assert_eq!(record, BlockRecord { start: 0, last: 2 });

        let engine = h.indexer.engine();
        assert_eq!(engine.allocator().lookup(&hash(11)).await.unwrap(), Some(1));
        assert_eq!(engine.allocator().lookup(&hash(12)).await.unwrap(), Some(2));
        assert_eq!(engine.allocator().lookup(&hash(10)).await.unwrap(), None);
        assert_eq!(engine.addresses().reverse(&hash(12)).await.unwrap(), Some(Count::new(GENESIS, 2)));
        assert!(engine.addresses().contains(&address(2), Count::new(GENESIS, 1)).await.unwrap());
        assert_eq!(engine.state(), IndexerState::Live);
    }

    #[tokio::test]
    async fn below_activation_writes_nothing() {
        let h = Harness::new(GENESIS);
        h.markers.mark(hash(1), TOKEN_ID);
        let b = block(GENESIS - 1, vec![tx(hash(1), &[], &[address(1)])]);
        assert!(h.connect(&b).await.unwrap().is_none());
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn reindexing_recorded_height_is_noop() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        h.connect(&b).await.unwrap();
        let before = h.store.snapshot().unwrap();
        assert!(h.indexer.engine().index_block(&b).await.unwrap().is_none());
        assert_eq!(h.store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn next_height_continues_sequence() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        h.connect(&b).await.unwrap();

        h.markers.mark(hash(20), TOKEN_ID);
        let next = block(GENESIS + 1, vec![tx(hash(20), &[], &[address(3)])]);
        assert_eq!(h.connect(&next).await.unwrap(), Some(BlockRecord { start: 2, last: 3 }));

        let empty = block(GENESIS + 2, vec![tx(hash(21), &[], &[address(3)])]);
        assert_eq!(h.connect(&empty).await.unwrap(), Some(BlockRecord { start: 3, last: 3 }));
    }

    #[tokio::test]
    async fn unindex_removes_introduced_indices() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        h.connect(&b).await.unwrap();

        let engine = h.indexer.engine();
        let record = engine.unindex_block(GENESIS, Some(&b)).await.unwrap();
        assert_eq!(record, Some(BlockRecord { start: 0, last: 2 }));
        assert_eq!(engine.allocator().hash_at(1).await.unwrap(), None);
        assert_eq!(engine.allocator().hash_at(2).await.unwrap(), None);
        assert!(h.store.is_empty().unwrap());

        // Idempotent.
        assert!(engine.unindex_block(GENESIS, Some(&b)).await.unwrap().is_none());
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn unindex_without_block_uses_chain_source() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        h.connect(&b).await.unwrap();
        h.indexer.engine().unindex_block(GENESIS, None).await.unwrap();
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn unindex_missing_tx_body_is_fatal_for_height() {
        let h = Harness::new(GENESIS);
        h.markers.mark(hash(30), TOKEN_ID);
        let b = block(GENESIS, vec![tx(hash(30), &[], &[address(1)])]);
        // Indexed directly, never registered with the chain source.
        h.indexer.engine().index_block(&b).await.unwrap();
        let before = h.store.snapshot().unwrap();

        let err = h.indexer.engine().unindex_block(GENESIS, None).await.unwrap_err();
        assert!(matches!(err, IndexerError::MissingCollaboratorData(_)));
        assert_eq!(h.store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn burn_is_indexed_under_input_owner() {
        let h = Harness::new(GENESIS);
        let owner = address(7);
        h.markers.mark(hash(40), TOKEN_ID);
        let p = block(GENESIS, vec![tx(hash(40), &[], &[owner.clone()])]);
        h.connect(&p).await.unwrap();

        // Q spends two outputs of P and carries no token.
        let q = tx(hash(41), &[spend(hash(40), 0), spend(hash(40), 1)], &[address(8)]);
        let qb = block_spending(
            GENESIS + 1,
            vec![q],
            &[(spend(hash(40), 0), owner.clone()), (spend(hash(40), 1), owner.clone())],
        );
        assert_eq!(h.connect(&qb).await.unwrap(), Some(BlockRecord { start: 1, last: 2 }));
        assert!(h
            .indexer
            .engine()
            .addresses()
            .contains(&owner, Count::new(GENESIS + 1, 0))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn failing_classifier_writes_nothing() {
        let h = Harness::new(GENESIS);
        h.markers.mark(hash(50), TOKEN_ID);
        h.markers.fail_on(hash(51));
        let b = block(
            GENESIS,
            vec![tx(hash(50), &[], &[address(1)]), tx(hash(51), &[], &[address(1)])],
        );
        let err = h.connect(&b).await.unwrap_err();
        assert!(matches!(err, IndexerError::Collaborator { .. }));
        assert!(h.store.is_empty().unwrap());
        assert_eq!(h.indexer.engine().state(), IndexerState::Error);
    }

    #[tokio::test]
    async fn rollback_to_unwinds_above_target() {
        let h = Harness::new(GENESIS);
        for i in 0..5u32 {
            let n = 100 + i;
            h.markers.mark(hash(n), TOKEN_ID);
            let b = block(GENESIS + i, vec![tx(hash(n), &[], &[address(1)])]);
            h.connect(&b).await.unwrap();
        }

        let engine = h.indexer.engine();
        assert_eq!(engine.rollback_to(GENESIS + 1).await.unwrap(), 3);
        assert_eq!(engine.ledger().highest().await.unwrap().map(|(h, _)| h), Some(GENESIS + 1));
        assert_eq!(engine.allocator().lookup(&hash(102)).await.unwrap(), None);
        assert_eq!(engine.allocator().lookup(&hash(101)).await.unwrap(), Some(2));
        assert!(engine.status().await.unwrap().pending_rollback.is_none());

        // Nothing left to do the second time.
        assert_eq!(engine.rollback_to(GENESIS + 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn round_trip_restores_store() {
        let h = Harness::new(GENESIS);
        let b = activation_block(&h).await;
        h.connect(&b).await.unwrap();
        let before = h.store.snapshot().unwrap();

        h.markers.mark(hash(60), TOKEN_ID);
        let next = block(GENESIS + 1, vec![tx(hash(60), &[], &[address(1), address(9)])]);
        h.connect(&next).await.unwrap();
        h.indexer.engine().rollback_to(GENESIS).await.unwrap();

        assert_eq!(h.store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn reused_index_rolls_back_cleanly() {
        let h = Harness::new(GENESIS);
        h.markers.mark(hash(1), TOKEN_ID);
        h.connect(&block(GENESIS, vec![tx(hash(1), &[], &[address(1)])])).await.unwrap();
        let before = h.store.snapshot().unwrap();

        // The same hash shows up again one height later and keeps index 1.
        let again = block(GENESIS + 1, vec![tx(hash(1), &[], &[address(1)])]);
        assert_eq!(h.connect(&again).await.unwrap(), Some(BlockRecord { start: 1, last: 1 }));
        let engine = h.indexer.engine();
        assert_eq!(engine.allocator().lookup(&hash(1)).await.unwrap(), Some(1));
        assert_eq!(engine.addresses().reverse(&hash(1)).await.unwrap(), Some(Count::new(GENESIS, 0)));
        assert!(!engine.addresses().contains(&address(1), Count::new(GENESIS + 1, 0)).await.unwrap());

        engine.rollback_to(GENESIS).await.unwrap();
        assert_eq!(h.store.snapshot().unwrap(), before);
        let page = h
            .indexer
            .query()
            .list_by_address(&address(1), crate::query::ListOptions::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);

        engine.rollback_to(GENESIS - 1).await.unwrap();
        assert!(h.store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn concurrent_first_writes_share_one_resume() {
        let h = Harness::new(GENESIS);
        for i in 0..3u32 {
            let n = 300 + i;
            h.markers.mark(hash(n), TOKEN_ID);
            h.connect(&block(GENESIS + i, vec![tx(hash(n), &[], &[address(1)])])).await.unwrap();
        }
        let checkpoints = CheckpointManager::new(h.store.clone(), Arc::new(KeySchema::default()));
        checkpoints.save(GENESIS).await.unwrap();

        let restarted = Arc::new(h.restart());
        let first = block(GENESIS + 1, vec![]);
        let second = block(GENESIS + 2, vec![]);
        let (a, b) = {
            let (r1, r2) = (restarted.clone(), restarted.clone());
            let t1 = tokio::spawn(async move { r1.indexer.engine().index_block(&first).await });
            let t2 = tokio::spawn(async move { r2.indexer.engine().index_block(&second).await });
            (t1.await.unwrap(), t2.await.unwrap())
        };
        assert!(a.is_ok(), "{a:?}");
        assert!(b.is_ok(), "{b:?}");
        assert!(checkpoints.load().await.unwrap().is_none());
        let tip = restarted.indexer.engine().ledger().highest().await.unwrap();
        assert_eq!(tip.map(|(height, _)| height), Some(GENESIS + 2));
    }

    #[tokio::test]
    async fn writes_refused_while_suspended() {
        let h = Harness::new(GENESIS);
        let engine = h.indexer.engine();
        let guard = engine.suspend(GENESIS).unwrap();

        let b = block(GENESIS, vec![]);
        assert!(matches!(
            engine.index_block(&b).await,
            Err(IndexerError::Suspended { target: GENESIS })
        ));
        assert!(matches!(
            engine.unindex_block(GENESIS, None).await,
            Err(IndexerError::Suspended { .. })
        ));
        assert!(engine.rollback_to(0).await.is_err());

        drop(guard);
        assert!(engine.index_block(&b).await.is_ok());
    }

    #[tokio::test]
    async fn interrupted_rollback_is_resumed() {
        let h = Harness::new(GENESIS);
        for i in 0..3u32 {
            let n = 200 + i;
            h.markers.mark(hash(n), TOKEN_ID);
            h.connect(&block(GENESIS + i, vec![tx(hash(n), &[], &[address(1)])])).await.unwrap();
        }
        // Crash right after the checkpoint was written.
        let checkpoints = CheckpointManager::new(h.store.clone(), Arc::new(KeySchema::default()));
        checkpoints.save(GENESIS).await.unwrap();

        // The first write after restart finishes the rollback, then indexes.
        let restarted = h.restart();
        restarted.markers.mark(hash(210), TOKEN_ID);
        let b = block(GENESIS + 1, vec![tx(hash(210), &[], &[address(1)])]);
        assert_eq!(restarted.connect(&b).await.unwrap(), Some(BlockRecord { start: 1, last: 2 }));

        let engine = restarted.indexer.engine();
        assert!(checkpoints.load().await.unwrap().is_none());
        assert_eq!(engine.allocator().lookup(&hash(202)).await.unwrap(), None);
        assert_eq!(engine.allocator().lookup(&hash(210)).await.unwrap(), Some(2));
    }
}
