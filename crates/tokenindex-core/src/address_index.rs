//! Address index: ordered `(address, height, pos)` existence markers plus the
//! forward `(height, pos) -> hash` and reverse `hash -> (height, pos)` maps
//! used to materialize rows and resume paginated scans.

use std::ops::Bound;
use std::sync::Arc;

use crate::codec::{decode_hash, KeySchema};
use crate::error::{IndexerError, Result};
use crate::store::{Direction, KeyRange, KvStore, WriteBatch};
use crate::types::{Address, Count, Hash256};

pub struct AddressIndex {
    store: Arc<dyn KvStore>,
    schema: Arc<KeySchema>,
}

impl AddressIndex {
    pub fn new(store: Arc<dyn KvStore>, schema: Arc<KeySchema>) -> Self {
        Self { store, schema }
    }

    // ─── Mutations (queued into the height's batch) ──────────────────────────

    pub fn put(&self, address: &Address, count: Count, batch: &mut WriteBatch) {
        batch.put(self.schema.address_key(address, count), Vec::new());
    }

    pub fn delete(&self, address: &Address, count: Count, batch: &mut WriteBatch) {
        batch.delete(self.schema.address_key(address, count));
    }

    pub fn put_forward(&self, count: Count, hash: &Hash256, batch: &mut WriteBatch) {
        batch.put(self.schema.forward_key(count), hash.as_bytes().to_vec());
    }

    pub fn delete_forward(&self, count: Count, batch: &mut WriteBatch) {
        batch.delete(self.schema.forward_key(count));
    }

    pub fn put_reverse(&self, hash: &Hash256, count: Count, batch: &mut WriteBatch) {
        batch.put(self.schema.reverse_key(hash), count.to_bytes().to_vec());
    }

    pub fn delete_reverse(&self, hash: &Hash256, batch: &mut WriteBatch) {
        batch.delete(self.schema.reverse_key(hash));
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    pub async fn forward(&self, count: Count) -> Result<Option<Hash256>> {
        match self.store.get(&self.schema.forward_key(count)).await? {
            Some(raw) => Ok(Some(decode_hash(&raw, "forward map")?)),
            None => Ok(None),
        }
    }

    pub async fn reverse(&self, hash: &Hash256) -> Result<Option<Count>> {
        match self.store.get(&self.schema.reverse_key(hash)).await? {
            Some(raw) => Ok(Some(Count::from_bytes(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn contains(&self, address: &Address, count: Count) -> Result<bool> {
        self.store.has(&self.schema.address_key(address, count)).await
    }

    /// Up to `limit` entries of `address`, strictly after `cursor` in the
    /// given direction, each resolved to its transaction hash.
    ///
    /// Ascending scans continue above the cursor, descending scans below it.
    /// An entry whose forward row is missing means the store is corrupt and
    /// yields [`IndexerError::MalformedRecord`].
    pub async fn range_query(
        &self,
        address: &Address,
        cursor: Option<Count>,
        limit: usize,
        direction: Direction,
    ) -> Result<Vec<(Count, Hash256)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let (min, max) = self.schema.address_bounds(address);
        let cursor_key = cursor.map(|c| self.schema.address_key(address, c));

        let range = match (direction, cursor_key) {
            (Direction::Ascending, Some(key)) => KeyRange::new(Bound::Excluded(key), Bound::Included(max)),
            (Direction::Descending, Some(key)) => KeyRange::new(Bound::Included(min), Bound::Excluded(key)),
            (_, None) => KeyRange::inclusive(min, max),
        }
        .direction(direction)
        .limit(limit);

        // Entries and forward rows come from one view, so a height unwound
        // mid-query is either fully visible or fully gone.
        let schema = self.schema.clone();
        let join = move |key: &[u8]| {
            schema
                .decode_address_key(key)
                .ok()
                .map(|count| schema.forward_key(count))
        };
        let rows = self.store.scan_join(range, &join).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let count = self.schema.decode_address_key(&row.key)?;
            let raw = row.joined.ok_or_else(|| {
                IndexerError::malformed(
                    "address entry",
                    format!("no forward row for height {} pos {}", count.height, count.pos),
                )
            })?;
            out.push((count, decode_hash(&raw, "forward map")?));
        }
        Ok(out)
    }
}
