//! Ordered key-value store seam.
//!
//! Every persisted record of the index lives in one [`KvStore`]. The engine
//! only needs point reads, bounded range scans in either direction, and
//! atomic multi-key batches; any engine that offers those (an LSM tree, a
//! B-tree, SQLite) can back the index.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::{IndexerError, Result};

/// Scan direction over the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// A bounded key range with an optional row limit.
#[derive(Debug, Clone)]
pub struct KeyRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
    pub limit: Option<usize>,
    pub direction: Direction,
}

impl KeyRange {
    pub fn new(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        Self {
            lower,
            upper,
            limit: None,
            direction: Direction::Ascending,
        }
    }

    /// Inclusive on both ends.
    pub fn inclusive(lower: Vec<u8>, upper: Vec<u8>) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn reverse(self) -> Self {
        self.direction(Direction::Descending)
    }

    /// `true` if no key can fall inside the bounds.
    pub fn is_empty(&self) -> bool {
        use Bound::*;
        match (&self.lower, &self.upper) {
            (Included(l), Included(u)) => l > u,
            (Included(l), Excluded(u)) | (Excluded(l), Included(u)) | (Excluded(l), Excluded(u)) => {
                l >= u
            }
            _ => false,
        }
    }

    /// `true` if `key` falls inside the bounds.
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l.as_slice(),
            Bound::Excluded(l) => key > l.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u.as_slice(),
            Bound::Excluded(u) => key < u.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Ordered list of mutations applied atomically by [`KvStore::write`].
///
/// Later operations on the same key win.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key,
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Maps a scanned key to the key of a related row.
pub type JoinFn = dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync;

/// A scanned row plus the related row fetched in the same read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// `None` when `join` produced no key or the related row is absent.
    pub joined: Option<Vec<u8>>,
}

/// Ordered key-value store with atomic batches.
///
/// Keys compare as raw bytes. Implementations must apply a [`WriteBatch`]
/// all-or-nothing, and readers must never observe half of one.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Key/value pairs inside `range`, in `range.direction` order, at most
    /// `range.limit` of them.
    async fn scan(&self, range: KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// [`scan`](Self::scan) `range` and fetch the row `join` derives from
    /// each scanned key, all from one consistent view of the store. A batch
    /// committed concurrently is seen entirely or not at all.
    async fn scan_join(&self, range: KeyRange, join: &JoinFn) -> Result<Vec<JoinedRow>>;

    /// Apply every operation in `batch` atomically.
    async fn write(&self, batch: WriteBatch) -> Result<()>;
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// In-memory ordered store for tests and ephemeral indexers.
///
/// All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Copy of the full key space, for assertions.
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.data
            .read()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn scan(&self, range: KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan_map(&*self.read()?, &range))
    }

    async fn scan_join(&self, range: KeyRange, join: &JoinFn) -> Result<Vec<JoinedRow>> {
        // One guard for the scan and every lookup.
        let data = self.read()?;
        Ok(scan_map(&data, &range)
            .into_iter()
            .map(|(key, value)| {
                let joined = join(&key).and_then(|k| data.get(&k).cloned());
                JoinedRow { key, value, joined }
            })
            .collect())
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

fn scan_map(data: &BTreeMap<Vec<u8>, Vec<u8>>, range: &KeyRange) -> Vec<(Vec<u8>, Vec<u8>)> {
    if range.is_empty() || range.limit == Some(0) {
        return Vec::new();
    }
    let iter = data.range::<Vec<u8>, _>((range.lower.clone(), range.upper.clone()));
    let limit = range.limit.unwrap_or(usize::MAX);
    match range.direction {
        Direction::Ascending => iter
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Direction::Descending => iter
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        for i in 0u8..10 {
            batch.put(vec![b'k', i], vec![i]);
        }
        store.write(batch).await.unwrap();
        store
    }

    #[tokio::test]
    async fn get_and_has() {
        let store = seeded().await;
        assert_eq!(store.get(&[b'k', 3]).await.unwrap(), Some(vec![3]));
        assert!(store.has(&[b'k', 9]).await.unwrap());
        assert!(!store.has(&[b'k', 10]).await.unwrap());
    }

    #[tokio::test]
    async fn scan_respects_bounds_and_direction() {
        let store = seeded().await;
        let range = KeyRange::new(Bound::Excluded(vec![b'k', 2]), Bound::Included(vec![b'k', 5]));

        let asc = store.scan(range.clone()).await.unwrap();
        let keys: Vec<u8> = asc.iter().map(|(k, _)| k[1]).collect();
        assert_eq!(keys, vec![3, 4, 5]);

        let desc = store.scan(range.reverse().limit(2)).await.unwrap();
        let keys: Vec<u8> = desc.iter().map(|(k, _)| k[1]).collect();
        assert_eq!(keys, vec![5, 4]);
    }

    #[tokio::test]
    async fn inverted_range_is_empty() {
        let store = seeded().await;
        let range = KeyRange::inclusive(vec![b'k', 7], vec![b'k', 2]);
        assert!(range.is_empty());
        assert!(store.scan(range).await.unwrap().is_empty());

        let touching = KeyRange::new(Bound::Excluded(vec![b'k', 4]), Bound::Excluded(vec![b'k', 4]));
        assert!(store.scan(touching).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_later_ops_win() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.delete(b"a".to_vec());
        batch.put(b"b".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        store.write(batch).await.unwrap();

        assert_eq!(store.get(b"a").await.unwrap(), None);
        assert_eq!(store.get(b"b").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn scan_join_fetches_related_rows() {
        let store = seeded().await;
        let mut batch = WriteBatch::new();
        batch.put(vec![b'v', 3], b"three".to_vec());
        store.write(batch).await.unwrap();

        let join = |key: &[u8]| (key[1] % 2 == 1).then(|| vec![b'v', key[1]]);
        let rows = store
            .scan_join(KeyRange::inclusive(vec![b'k', 2], vec![b'k', 4]), &join)
            .await
            .unwrap();
        let joined: Vec<Option<Vec<u8>>> = rows.into_iter().map(|r| r.joined).collect();
        assert_eq!(joined, vec![None, Some(b"three".to_vec()), None]);
    }

    #[test]
    fn range_contains() {
        let range = KeyRange::new(Bound::Included(vec![1]), Bound::Excluded(vec![3]));
        assert!(range.contains(&[1]));
        assert!(range.contains(&[2, 255]));
        assert!(!range.contains(&[3]));
        assert!(!range.contains(&[0, 9]));
    }
}
