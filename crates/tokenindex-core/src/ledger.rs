//! Block record ledger.
//!
//! One [`BlockRecord`] per indexed height, recording which sequential indices
//! that height introduced. Rollback of a height is exact because it only has
//! to visit `(start, last]`.

use std::ops::Bound;
use std::sync::Arc;

use crate::codec::KeySchema;
use crate::error::Result;
use crate::store::{KeyRange, KvStore, WriteBatch};
use crate::types::BlockRecord;

pub struct BlockLedger {
    store: Arc<dyn KvStore>,
    schema: Arc<KeySchema>,
    activation_height: u32,
}

impl BlockLedger {
    pub fn new(store: Arc<dyn KvStore>, schema: Arc<KeySchema>, activation_height: u32) -> Self {
        Self {
            store,
            schema,
            activation_height,
        }
    }

    pub fn activation_height(&self) -> u32 {
        self.activation_height
    }

    /// Seed the record for `height`, or `None` below the activation height.
    ///
    /// The record starts where the closest recorded height below `height`
    /// ended. In a contiguous chain that is `height - 1`; heights with no
    /// record underneath start from 0.
    pub async fn begin_block(&self, height: u32) -> Result<Option<BlockRecord>> {
        if height < self.activation_height {
            return Ok(None);
        }
        let last = match self.highest_below(height).await? {
            Some((_, record)) => record.last,
            None => 0,
        };
        Ok(Some(BlockRecord::starting_after(last)))
    }

    /// Queue the record for `height` into the height's batch.
    pub fn end_block(&self, height: u32, record: &BlockRecord, batch: &mut WriteBatch) {
        batch.put(self.schema.block_record_key(height), record.to_bytes().to_vec());
    }

    pub async fn get(&self, height: u32) -> Result<Option<BlockRecord>> {
        match self.store.get(&self.schema.block_record_key(height)).await? {
            Some(raw) => Ok(Some(BlockRecord::from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    /// Indices introduced by `height`, or `None` if it was never indexed.
    pub async fn range(&self, height: u32) -> Result<Option<std::ops::RangeInclusive<u32>>> {
        Ok(self.get(height).await?.map(|r| {
            if r.is_empty() {
                1..=0
            } else {
                r.start + 1..=r.last
            }
        }))
    }

    /// Highest recorded height and its record.
    pub async fn highest(&self) -> Result<Option<(u32, BlockRecord)>> {
        self.last_in(Bound::Unbounded).await
    }

    /// Highest recorded height strictly below `height`.
    pub async fn highest_below(&self, height: u32) -> Result<Option<(u32, BlockRecord)>> {
        self.last_in(Bound::Excluded(self.schema.block_record_key(height)))
            .await
    }

    /// Records with heights in `from..=to`, ascending.
    pub async fn records(&self, from: u32, to: u32) -> Result<Vec<(u32, BlockRecord)>> {
        let range = KeyRange::inclusive(
            self.schema.block_record_key(from),
            self.schema.block_record_key(to),
        );
        self.store
            .scan(range)
            .await?
            .into_iter()
            .map(|(k, v)| -> Result<(u32, BlockRecord)> {
                Ok((self.schema.decode_block_record_key(&k)?, BlockRecord::from_bytes(&v)?))
            })
            .collect()
    }

    pub fn remove(&self, height: u32, batch: &mut WriteBatch) {
        batch.delete(self.schema.block_record_key(height));
    }

    async fn last_in(&self, upper: Bound<Vec<u8>>) -> Result<Option<(u32, BlockRecord)>> {
        let upper = match upper {
            Bound::Unbounded => Bound::Included(self.schema.block_record_key(u32::MAX)),
            other => other,
        };
        let range = KeyRange::new(Bound::Included(self.schema.block_record_key(0)), upper)
            .reverse()
            .limit(1);
        match self.store.scan(range).await?.into_iter().next() {
            Some((k, v)) => Ok(Some((
                self.schema.decode_block_record_key(&k)?,
                BlockRecord::from_bytes(&v)?,
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger(activation: u32) -> (Arc<MemoryStore>, BlockLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = BlockLedger::new(store.clone(), Arc::new(KeySchema::default()), activation);
        (store, ledger)
    }

    async fn put(store: &MemoryStore, ledger: &BlockLedger, height: u32, record: BlockRecord) {
        let mut batch = WriteBatch::new();
        ledger.end_block(height, &record, &mut batch);
        store.write(batch).await.unwrap();
    }

    #[tokio::test]
    async fn below_activation_is_not_indexed() {
        let (_, ledger) = ledger(866_600);
        assert!(ledger.begin_block(866_599).await.unwrap().is_none());
        assert_eq!(
            ledger.begin_block(866_600).await.unwrap(),
            Some(BlockRecord { start: 0, last: 0 })
        );
    }

    #[tokio::test]
    async fn seeds_from_previous_height() {
        let (store, ledger) = ledger(100);
        put(&store, &ledger, 100, BlockRecord { start: 0, last: 2 }).await;
        put(&store, &ledger, 101, BlockRecord { start: 2, last: 2 }).await;

        let seeded = ledger.begin_block(102).await.unwrap().unwrap();
        assert_eq!(seeded, BlockRecord { start: 2, last: 2 });

        // A record above the height being begun is ignored.
        put(&store, &ledger, 110, BlockRecord { start: 2, last: 9 }).await;
        assert_eq!(ledger.begin_block(102).await.unwrap().unwrap().start, 2);
    }

    #[tokio::test]
    async fn highest_and_records() {
        let (store, ledger) = ledger(0);
        assert!(ledger.highest().await.unwrap().is_none());

        put(&store, &ledger, 5, BlockRecord { start: 0, last: 1 }).await;
        put(&store, &ledger, 256, BlockRecord { start: 1, last: 4 }).await;
        put(&store, &ledger, 7, BlockRecord { start: 1, last: 1 }).await;

        assert_eq!(
            ledger.highest().await.unwrap(),
            Some((256, BlockRecord { start: 1, last: 4 }))
        );
        let heights: Vec<u32> = ledger
            .records(0, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|(h, _)| h)
            .collect();
        assert_eq!(heights, vec![5, 7]);
    }

    #[tokio::test]
    async fn range_is_exact() {
        let (store, ledger) = ledger(0);
        put(&store, &ledger, 9, BlockRecord { start: 4, last: 7 }).await;
        put(&store, &ledger, 10, BlockRecord { start: 7, last: 7 }).await;

        assert_eq!(ledger.range(9).await.unwrap().unwrap().collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(ledger.range(10).await.unwrap().unwrap().count(), 0);
        assert!(ledger.range(11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_deletes_record() {
        let (store, ledger) = ledger(0);
        put(&store, &ledger, 3, BlockRecord { start: 0, last: 1 }).await;
        let mut batch = WriteBatch::new();
        ledger.remove(3, &mut batch);
        store.write(batch).await.unwrap();
        assert!(ledger.get(3).await.unwrap().is_none());
    }
}
