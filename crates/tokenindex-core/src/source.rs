//! Host-side data sources: the confirmed-chain materializer, the
//! unconfirmed-transaction pool and the token-info source.

use async_trait::async_trait;

use crate::error::Result;
use crate::query::ListOrder;
use crate::types::{Address, Coin, Hash256, OutPoint, TokenOutputRecord, TokenRecord, TxView};

/// Materializes confirmed transactions and coins from the host chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Full view of a confirmed transaction, including the coins it spent.
    async fn transaction(&self, hash: &Hash256) -> Result<Option<TxView>>;

    /// Unspent confirmed coins owned by `address`.
    async fn coins_by_address(&self, address: &Address) -> Result<Vec<Coin>>;
}

/// Selection of unconfirmed transactions for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolQuery {
    pub limit: usize,
    /// Resume strictly after this transaction in `order`.
    pub after: Option<Hash256>,
    pub order: ListOrder,
}

/// The host's unconfirmed-transaction pool.
#[async_trait]
pub trait UnconfirmedPool: Send + Sync {
    /// Unconfirmed token-relevant transactions touching `address`, in entry
    /// order (or its reverse). An `after` hash the pool does not hold yields
    /// an empty list.
    async fn list_by_address(&self, address: &Address, query: PoolQuery) -> Result<Vec<TxView>>;

    async fn transaction(&self, hash: &Hash256) -> Result<Option<TxView>>;

    async fn coins_by_address(&self, address: &Address) -> Result<Vec<Coin>>;

    /// Hash of the unconfirmed transaction spending `outpoint`, if any.
    async fn spender(&self, outpoint: &OutPoint) -> Result<Option<Hash256>>;
}

/// Pool used when the host runs without one: always empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPool;

#[async_trait]
impl UnconfirmedPool for NoopPool {
    async fn list_by_address(&self, _address: &Address, _query: PoolQuery) -> Result<Vec<TxView>> {
        Ok(Vec::new())
    }

    async fn transaction(&self, _hash: &Hash256) -> Result<Option<TxView>> {
        Ok(None)
    }

    async fn coins_by_address(&self, _address: &Address) -> Result<Vec<Coin>> {
        Ok(Vec::new())
    }

    async fn spender(&self, _outpoint: &OutPoint) -> Result<Option<Hash256>> {
        Ok(None)
    }
}

/// Token details kept by the host's token validator, used to enrich query
/// results. Confirmed and unconfirmed transactions are both covered.
#[async_trait]
pub trait TokenInfo: Send + Sync {
    /// Token amounts of the outputs of `hash`; empty when it carries none.
    async fn output_records(&self, hash: &Hash256) -> Result<Vec<TokenOutputRecord>>;

    async fn token(&self, token_id: &Hash256) -> Result<Option<TokenRecord>>;
}

/// Token-info source used when the host has none: knows no tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTokenInfo;

#[async_trait]
impl TokenInfo for NoopTokenInfo {
    async fn output_records(&self, _hash: &Hash256) -> Result<Vec<TokenOutputRecord>> {
        Ok(Vec::new())
    }

    async fn token(&self, _token_id: &Hash256) -> Result<Option<TokenRecord>> {
        Ok(None)
    }
}
