//! Sequential index allocator.
//!
//! Each relevant transaction hash gets a dense 32-bit identifier. Identifiers
//! are minted in strictly increasing order from the current height's
//! [`BlockRecord`], and the hash <-> index mapping is written in both
//! directions into the height's batch.

use std::sync::Arc;

use crate::codec::{decode_hash, decode_u32, encode_u32, KeySchema};
use crate::error::{IndexerError, Result};
use crate::store::{KvStore, WriteBatch};
use crate::types::{BlockRecord, Hash256};

pub struct SequentialAllocator {
    store: Arc<dyn KvStore>,
    schema: Arc<KeySchema>,
}

impl SequentialAllocator {
    pub fn new(store: Arc<dyn KvStore>, schema: Arc<KeySchema>) -> Self {
        Self { store, schema }
    }

    /// Return the index for `hash`, minting a new one if needed.
    ///
    /// An existing mapping is reused only when it was issued at or before the
    /// point this height started (`index <= record.start`). Any other
    /// existing mapping is stale and is superseded by a fresh index, so every
    /// index inside `(record.start, record.last]` belongs to this height.
    pub async fn allocate(
        &self,
        hash: &Hash256,
        record: &mut BlockRecord,
        batch: &mut WriteBatch,
    ) -> Result<u32> {
        if let Some(existing) = self.lookup(hash).await? {
            if existing <= record.start {
                return Ok(existing);
            }
        }

        let index = record
            .last
            .checked_add(1)
            .ok_or(IndexerError::IndexOverflow { last: record.last })?;

        batch.put(self.schema.hash_index_key(hash), encode_u32(index));
        batch.put(self.schema.index_hash_key(index), hash.as_bytes().to_vec());
        record.last = index;

        tracing::trace!(%hash, index, "index allocated");
        Ok(index)
    }

    /// The index currently mapped to `hash`.
    pub async fn lookup(&self, hash: &Hash256) -> Result<Option<u32>> {
        match self.store.get(&self.schema.hash_index_key(hash)).await? {
            Some(raw) => Ok(Some(decode_u32(&raw, "hash->index")?)),
            None => Ok(None),
        }
    }

    /// The hash currently mapped to `index`.
    pub async fn hash_at(&self, index: u32) -> Result<Option<Hash256>> {
        match self.store.get(&self.schema.index_hash_key(index)).await? {
            Some(raw) => Ok(Some(decode_hash(&raw, "index->hash")?)),
            None => Ok(None),
        }
    }

    /// Queue deletion of both directions of a mapping.
    pub fn release(&self, hash: &Hash256, index: u32, batch: &mut WriteBatch) {
        batch.delete(self.schema.hash_index_key(hash));
        batch.delete(self.schema.index_hash_key(index));
    }
}
