//! tokenindex-core: reorg-safe secondary index of token transactions.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → TokenIndexer (ChainListener)
//!                      ├── IndexingEngine
//!                      │     ├── SequentialAllocator (hash ↔ dense u32 index)
//!                      │     ├── BlockLedger         (per-height index ranges)
//!                      │     ├── AddressIndex        (address → (height, pos) → hash)
//!                      │     ├── CheckpointManager   (resumable rollback)
//!                      │     └── Classifier          (carrier / burn detection)
//!                      ├── QueryEngine   (hash lookup, paginated history, coins)
//!                      └── KvStore       (memory / SQLite)
//! ```

pub mod address_index;
pub mod allocator;
pub mod builder;
pub mod checkpoint;
pub mod classifier;
pub mod codec;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod listener;
pub mod query;
pub mod source;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builder::IndexerBuilder;
pub use checkpoint::{CheckpointManager, RollbackCheckpoint};
pub use classifier::{Classifier, MarkerClassifier, MarkerIndex, Relevance};
pub use codec::KeySchema;
pub use engine::IndexingEngine;
pub use error::IndexerError;
pub use indexer::{IndexStatus, IndexerConfig, IndexerState, TokenIndexer};
pub use listener::{ChainListener, HostAdapter};
pub use query::{ListOptions, ListOrder, Page, QueryEngine};
pub use source::{ChainSource, NoopPool, NoopTokenInfo, PoolQuery, TokenInfo, UnconfirmedPool};
pub use store::{Direction, KeyRange, KvStore, MemoryStore, WriteBatch};
pub use types::{
    Address, BlockRecord, Coin, CoinView, ConnectedBlock, Count, Hash256, OutPoint,
    TokenOutputRecord, TokenRecord, Transaction, TxView,
};
