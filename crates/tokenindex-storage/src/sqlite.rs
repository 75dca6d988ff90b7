//! SQLite storage backend for the token index.
//!
//! Every record lives in one `kv` table keyed by a BLOB. SQLite compares
//! BLOBs with `memcmp`, so `ORDER BY key` is the same byte order the key
//! codec relies on. Each [`WriteBatch`] runs inside one SQL transaction.
//!
//! # Usage
//! ```rust,no_run
//! use tokenindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./tokenindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::ops::Bound;
use tracing::debug;

use tokenindex_core::error::{IndexerError, Result};
use tokenindex_core::store::{BatchOp, Direction, JoinFn, JoinedRow, KeyRange, KvStore, WriteBatch};

/// SQLite-backed ordered key-value store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./tokenindex.db"`) or a full
    /// SQLite URL (`"sqlite:./tokenindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(path, "sqlite store opened");
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to one connection that never expires. All data is lost
    /// when the store is dropped.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the table and enable WAL mode.
    async fn init_schema(&self) -> Result<()> {
        // Readers never block the single writer under WAL
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                key   BLOB PRIMARY KEY NOT NULL,
                value BLOB
            ) WITHOUT ROWID;",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Number of stored keys.
    pub async fn len(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM kv")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        let cnt: i64 = row.try_get("cnt").map_err(storage)?;
        Ok(cnt as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(r) => {
                let value: Option<Vec<u8>> = r.try_get("value").map_err(storage)?;
                Ok(Some(value.unwrap_or_default()))
            }
            None => Ok(None),
        }
    }

    async fn scan(&self, range: KeyRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if range.is_empty() || range.limit == Some(0) {
            return Ok(Vec::new());
        }
        let sql = scan_sql(&range);
        let rows = scan_query(&sql, &range)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(key_value).collect()
    }

    async fn scan_join(&self, range: KeyRange, join: &JoinFn) -> Result<Vec<JoinedRow>> {
        if range.is_empty() || range.limit == Some(0) {
            return Ok(Vec::new());
        }
        // Under WAL a transaction reads from one snapshot until it ends.
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let sql = scan_sql(&range);
        let rows = scan_query(&sql, &range)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let (key, value) = key_value(row)?;
            let joined = match join(&key) {
                Some(related) => {
                    let found = sqlx::query("SELECT value FROM kv WHERE key = ?")
                        .bind(related)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(storage)?;
                    match found {
                        Some(r) => {
                            let v: Option<Vec<u8>> = r.try_get("value").map_err(storage)?;
                            Some(v.unwrap_or_default())
                        }
                        None => None,
                    }
                }
                None => None,
            };
            out.push(JoinedRow { key, value, joined });
        }
        tx.commit().await.map_err(storage)?;
        Ok(out)
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage)?;
                }
                BatchOp::Delete { key } => {
                    sqlx::query("DELETE FROM kv WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage)?;
                }
            }
        }
        tx.commit().await.map_err(storage)?;
        debug!(ops, "batch committed");
        Ok(())
    }
}

fn scan_sql(range: &KeyRange) -> String {
    let mut sql = String::from("SELECT key, value FROM kv WHERE 1 = 1");
    match &range.lower {
        Bound::Included(_) => sql.push_str(" AND key >= ?"),
        Bound::Excluded(_) => sql.push_str(" AND key > ?"),
        Bound::Unbounded => {}
    }
    match &range.upper {
        Bound::Included(_) => sql.push_str(" AND key <= ?"),
        Bound::Excluded(_) => sql.push_str(" AND key < ?"),
        Bound::Unbounded => {}
    }
    sql.push_str(match range.direction {
        Direction::Ascending => " ORDER BY key ASC",
        Direction::Descending => " ORDER BY key DESC",
    });
    if range.limit.is_some() {
        sql.push_str(" LIMIT ?");
    }
    sql
}

/// Bind the parameters `scan_sql` left placeholders for.
fn scan_query<'q>(sql: &'q str, range: &'q KeyRange) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    if let Bound::Included(k) | Bound::Excluded(k) = &range.lower {
        query = query.bind(k.as_slice());
    }
    if let Bound::Included(k) | Bound::Excluded(k) = &range.upper {
        query = query.bind(k.as_slice());
    }
    if let Some(limit) = range.limit {
        query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    query
}

fn key_value(row: &SqliteRow) -> Result<(Vec<u8>, Vec<u8>)> {
    let key: Vec<u8> = row.try_get("key").map_err(storage)?;
    let value: Option<Vec<u8>> = row.try_get("value").map_err(storage)?;
    Ok((key, value.unwrap_or_default()))
}

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut batch = WriteBatch::new();
        for i in [0u8, 1, 2, 10, 255] {
            batch.put(vec![b'k', i], vec![i]);
        }
        batch.put(vec![b'k', 2, 0], vec![]);
        batch.put(vec![b'j'], vec![9]);
        store.write(batch).await.unwrap();
        store
    }

    fn keys(rows: &[(Vec<u8>, Vec<u8>)]) -> Vec<Vec<u8>> {
        rows.iter().map(|(k, _)| k.clone()).collect()
    }

    #[tokio::test]
    async fn get_roundtrip() {
        let store = seeded().await;
        assert_eq!(store.get(&[b'k', 10]).await.unwrap(), Some(vec![10]));
        assert_eq!(store.get(&[b'k', 3]).await.unwrap(), None);
        assert!(store.has(&[b'j']).await.unwrap());
    }

    #[tokio::test]
    async fn empty_values_survive() {
        let store = seeded().await;
        assert_eq!(store.get(&[b'k', 2, 0]).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn scan_uses_byte_order() {
        let store = seeded().await;
        let range = KeyRange::inclusive(vec![b'k'], vec![b'k', 0xff, 0xff]);
        let rows = store.scan(range.clone()).await.unwrap();
        assert_eq!(
            keys(&rows),
            vec![
                vec![b'k', 0],
                vec![b'k', 1],
                vec![b'k', 2],
                vec![b'k', 2, 0],
                vec![b'k', 10],
                vec![b'k', 255],
            ]
        );

        let rows = store.scan(range.reverse().limit(2)).await.unwrap();
        assert_eq!(keys(&rows), vec![vec![b'k', 255], vec![b'k', 10]]);
    }

    #[tokio::test]
    async fn scan_exclusive_bounds() {
        let store = seeded().await;
        let range = KeyRange::new(Bound::Excluded(vec![b'k', 1]), Bound::Excluded(vec![b'k', 10]));
        let rows = store.scan(range).await.unwrap();
        assert_eq!(keys(&rows), vec![vec![b'k', 2], vec![b'k', 2, 0]]);

        let unbounded = KeyRange::new(Bound::Unbounded, Bound::Excluded(vec![b'k']));
        assert_eq!(keys(&store.scan(unbounded).await.unwrap()), vec![vec![b'j']]);
    }

    #[tokio::test]
    async fn scan_join_reads_related_rows() {
        let store = seeded().await;
        let join = |key: &[u8]| (key.len() == 2 && key[1] == 10).then(|| vec![b'j']);
        let rows = store
            .scan_join(KeyRange::inclusive(vec![b'k', 2], vec![b'k', 10]), &join)
            .await
            .unwrap();
        let joined: Vec<Option<Vec<u8>>> = rows.into_iter().map(|r| r.joined).collect();
        assert_eq!(joined, vec![None, None, Some(vec![9])]);
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        let store = seeded().await;
        let mut batch = WriteBatch::new();
        batch.delete(vec![b'k', 0]);
        batch.put(vec![b'k', 1], vec![42]);
        batch.delete(vec![b'k', 1]);
        batch.put(vec![b'k', 1], vec![43]);
        store.write(batch).await.unwrap();

        assert_eq!(store.get(&[b'k', 0]).await.unwrap(), None);
        assert_eq!(store.get(&[b'k', 1]).await.unwrap(), Some(vec![43]));
        assert_eq!(store.len().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "tokenindex-{}-{}.db",
            std::process::id(),
            unique_suffix()
        ));
        let path_str = path.to_string_lossy().to_string();
        {
            let store = SqliteStore::open(&path_str).await.unwrap();
            let mut batch = WriteBatch::new();
            batch.put(b"persist".to_vec(), b"yes".to_vec());
            store.write(batch).await.unwrap();
            store.pool.close().await;
        }
        let reopened = SqliteStore::open(&path_str).await.unwrap();
        assert_eq!(reopened.get(b"persist").await.unwrap(), Some(b"yes".to_vec()));
        reopened.pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    fn unique_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }
}
