//! Static collaborators and block builders for tests.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! dependent crates' tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::builder::IndexerBuilder;
use crate::classifier::{collect_addresses, MarkerIndex};
use crate::error::{IndexerError, Result};
use crate::indexer::TokenIndexer;
use crate::query::ListOrder;
use crate::source::{ChainSource, PoolQuery, TokenInfo, UnconfirmedPool};
use crate::store::{KvStore, MemoryStore};
use crate::types::{
    Address, BlockRecord, Coin, CoinView, ConnectedBlock, Hash256, Input, OutPoint, Output,
    TokenOutputRecord, TokenRecord, Transaction, TxView,
};

/// Token id the test harness monitors.
pub const TOKEN_ID: Hash256 = Hash256([0x7e; 32]);

/// Block timestamp reported for every confirmed test transaction.
pub const BLOCK_TIME: i64 = 1_700_000_000;

// ─── Builders ─────────────────────────────────────────────────────────────────

/// Distinct, non-null hash for `n`.
pub fn hash(n: u32) -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xee;
    bytes[28..].copy_from_slice(&n.to_be_bytes());
    Hash256(bytes)
}

/// Twenty-byte address filled with `n`.
pub fn address(n: u8) -> Address {
    Address::new(0, vec![n; 20]).expect("20-byte address hash")
}

pub fn spend(hash: Hash256, index: u32) -> OutPoint {
    OutPoint::new(hash, index)
}

/// A transaction spending `inputs` and paying 546 to each of `outputs`.
pub fn tx(hash: Hash256, inputs: &[OutPoint], outputs: &[Address]) -> Transaction {
    Transaction {
        hash,
        inputs: inputs.iter().map(|prevout| Input { prevout: *prevout }).collect(),
        outputs: outputs
            .iter()
            .map(|a| Output {
                value: 546,
                address: Some(a.clone()),
            })
            .collect(),
    }
}

/// A block with an empty coin view.
pub fn block(height: u32, transactions: Vec<Transaction>) -> ConnectedBlock {
    block_spending(height, transactions, &[])
}

/// A block whose view owns each spent outpoint by the paired address.
pub fn block_spending(
    height: u32,
    transactions: Vec<Transaction>,
    spent: &[(OutPoint, Address)],
) -> ConnectedBlock {
    let mut block_hash = [0u8; 32];
    block_hash[0] = 0xbb;
    block_hash[28..].copy_from_slice(&height.to_be_bytes());
    ConnectedBlock {
        height,
        hash: Hash256(block_hash),
        transactions,
        view: spent
            .iter()
            .map(|(outpoint, owner)| Coin {
                outpoint: *outpoint,
                value: 546,
                address: Some(owner.clone()),
                height: None,
                token: None,
            })
            .collect(),
    }
}

/// Coins of `view` spent by `tx`.
fn spent_by(tx: &Transaction, view: &CoinView) -> CoinView {
    tx.inputs
        .iter()
        .filter_map(|input| view.get(&input.prevout).cloned())
        .collect()
}

// ─── StaticMarkers ────────────────────────────────────────────────────────────

/// Marker index backed by a map; selected hashes fail with a collaborator
/// error.
#[derive(Default)]
pub struct StaticMarkers {
    markers: RwLock<HashMap<Hash256, Vec<Hash256>>>,
    failing: RwLock<HashSet<Hash256>>,
}

impl StaticMarkers {
    pub fn mark(&self, tx: Hash256, token: Hash256) {
        self.markers.write().unwrap().entry(tx).or_default().push(token);
    }

    pub fn fail_on(&self, tx: Hash256) {
        self.failing.write().unwrap().insert(tx);
    }
}

#[async_trait]
impl MarkerIndex for StaticMarkers {
    async fn markers(&self, hash: &Hash256) -> Result<Option<Vec<Hash256>>> {
        if self.failing.read().unwrap().contains(hash) {
            return Err(IndexerError::Collaborator {
                collaborator: "markers".into(),
                reason: format!("lookup of {hash} failed"),
            });
        }
        Ok(self.markers.read().unwrap().get(hash).cloned())
    }
}

// ─── StaticChain ──────────────────────────────────────────────────────────────

/// Chain source holding every transaction of the blocks it was given.
#[derive(Default)]
pub struct StaticChain {
    txs: RwLock<HashMap<Hash256, TxView>>,
    coins: RwLock<Vec<Coin>>,
}

impl StaticChain {
    pub fn insert_block(&self, block: &ConnectedBlock) {
        let mut txs = self.txs.write().unwrap();
        for tx in &block.transactions {
            txs.insert(
                tx.hash,
                TxView {
                    tx: tx.clone(),
                    height: Some(block.height),
                    time: Some(BLOCK_TIME),
                    coins: spent_by(tx, &block.view),
                    token: None,
                    output_tokens: Vec::new(),
                },
            );
        }
    }

    pub fn add_coin(&self, outpoint: OutPoint, value: u64, owner: Address, height: u32) {
        self.coins.write().unwrap().push(Coin {
            outpoint,
            value,
            address: Some(owner),
            height: Some(height),
            token: None,
        });
    }
}

#[async_trait]
impl ChainSource for StaticChain {
    async fn transaction(&self, hash: &Hash256) -> Result<Option<TxView>> {
        Ok(self.txs.read().unwrap().get(hash).cloned())
    }

    async fn coins_by_address(&self, address: &Address) -> Result<Vec<Coin>> {
        Ok(self
            .coins
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.address.as_ref() == Some(address))
            .cloned()
            .collect())
    }
}

// ─── StaticPool ───────────────────────────────────────────────────────────────

/// Unconfirmed pool holding transactions in arrival order.
#[derive(Default)]
pub struct StaticPool {
    txs: RwLock<Vec<TxView>>,
}

impl StaticPool {
    pub fn push(&self, tx: Transaction) {
        self.txs.write().unwrap().push(TxView {
            tx,
            height: None,
            time: None,
            coins: CoinView::new(),
            token: None,
            output_tokens: Vec::new(),
        });
    }
}

#[async_trait]
impl UnconfirmedPool for StaticPool {
    async fn list_by_address(&self, address: &Address, query: PoolQuery) -> Result<Vec<TxView>> {
        let txs = self.txs.read().unwrap();
        let mut touching: Vec<&TxView> = txs
            .iter()
            .filter(|v| collect_addresses(&v.tx, &v.coins).contains(address))
            .collect();
        if query.order == ListOrder::NewestFirst {
            touching.reverse();
        }
        let start = match query.after {
            Some(after) => match touching.iter().position(|v| v.hash() == after) {
                Some(i) => i + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(touching
            .into_iter()
            .skip(start)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn transaction(&self, hash: &Hash256) -> Result<Option<TxView>> {
        Ok(self.txs.read().unwrap().iter().find(|v| v.hash() == *hash).cloned())
    }

    async fn coins_by_address(&self, address: &Address) -> Result<Vec<Coin>> {
        let txs = self.txs.read().unwrap();
        let mut coins = Vec::new();
        for view in txs.iter() {
            for (index, output) in view.tx.outputs.iter().enumerate() {
                if output.address.as_ref() == Some(address) {
                    coins.push(Coin {
                        outpoint: OutPoint::new(view.hash(), index as u32),
                        value: output.value,
                        address: output.address.clone(),
                        height: None,
                        token: None,
                    });
                }
            }
        }
        Ok(coins)
    }

    async fn spender(&self, outpoint: &OutPoint) -> Result<Option<Hash256>> {
        Ok(self
            .txs
            .read()
            .unwrap()
            .iter()
            .find(|v| v.tx.inputs.iter().any(|i| i.prevout == *outpoint))
            .map(TxView::hash))
    }
}

// ─── StaticTokens ─────────────────────────────────────────────────────────────

/// Token-info source holding per-transaction output records and token records.
#[derive(Default)]
pub struct StaticTokens {
    outputs: RwLock<HashMap<Hash256, Vec<TokenOutputRecord>>>,
    tokens: RwLock<HashMap<Hash256, TokenRecord>>,
}

impl StaticTokens {
    pub fn add_token(&self, record: TokenRecord) {
        self.tokens.write().unwrap().insert(record.token_id, record);
    }

    /// Assign `amounts` as `(vout, amount)` of `token_id` to the outputs of `tx`.
    pub fn add_outputs(&self, tx: Hash256, token_id: Option<Hash256>, amounts: &[(u32, u64)]) {
        let records = amounts
            .iter()
            .map(|&(vout, amount)| TokenOutputRecord { vout, token_id, amount })
            .collect();
        self.outputs.write().unwrap().insert(tx, records);
    }
}

#[async_trait]
impl TokenInfo for StaticTokens {
    async fn output_records(&self, hash: &Hash256) -> Result<Vec<TokenOutputRecord>> {
        Ok(self.outputs.read().unwrap().get(hash).cloned().unwrap_or_default())
    }

    async fn token(&self, token_id: &Hash256) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.read().unwrap().get(token_id).cloned())
    }
}

/// Token record for [`TOKEN_ID`].
pub fn token_record() -> TokenRecord {
    TokenRecord {
        token_id: TOKEN_ID,
        ticker: "TST".into(),
        name: "Test Token".into(),
        document_uri: None,
        decimals: 2,
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

/// A [`TokenIndexer`] wired to static collaborators over a shared store.
pub struct Harness<S: KvStore + 'static = MemoryStore> {
    pub store: Arc<S>,
    pub markers: Arc<StaticMarkers>,
    pub chain: Arc<StaticChain>,
    pub pool: Arc<StaticPool>,
    pub tokens: Arc<StaticTokens>,
    pub indexer: TokenIndexer,
    activation_height: u32,
}

impl Harness<MemoryStore> {
    pub fn new(activation_height: u32) -> Self {
        Self::with_store(activation_height, Arc::new(MemoryStore::new()))
    }
}

impl<S: KvStore + 'static> Harness<S> {
    pub fn with_store(activation_height: u32, store: Arc<S>) -> Self {
        Self::assemble(
            activation_height,
            store,
            Arc::default(),
            Arc::default(),
            Arc::default(),
            Arc::default(),
        )
    }

    /// A fresh indexer over the same store and collaborators, as after a
    /// process restart.
    pub fn restart(&self) -> Self {
        Self::assemble(
            self.activation_height,
            self.store.clone(),
            self.markers.clone(),
            self.chain.clone(),
            self.pool.clone(),
            self.tokens.clone(),
        )
    }

    /// Make `block` visible to the chain source, then index it.
    pub async fn connect(&self, block: &ConnectedBlock) -> Result<Option<BlockRecord>> {
        self.chain.insert_block(block);
        self.indexer.engine().index_block(block).await
    }

    fn assemble(
        activation_height: u32,
        store: Arc<S>,
        markers: Arc<StaticMarkers>,
        chain: Arc<StaticChain>,
        pool: Arc<StaticPool>,
        tokens: Arc<StaticTokens>,
    ) -> Self {
        let indexer = IndexerBuilder::new()
            .id("test")
            .activation_height(activation_height)
            .token_id(TOKEN_ID)
            .store(store.clone())
            .markers(markers.clone())
            .chain(chain.clone())
            .pool(pool.clone())
            .token_info(tokens.clone())
            .build()
            .expect("valid test configuration");
        Self {
            store,
            markers,
            chain,
            pool,
            tokens,
            indexer,
            activation_height,
        }
    }
}
