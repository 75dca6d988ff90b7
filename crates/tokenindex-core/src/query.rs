//! Query engine: hash lookup, paginated address history, and address coins.
//!
//! Address history merges two sources. Unconfirmed transactions from the
//! pool are always newer than anything indexed, so newest-first pages serve
//! the pool before the index and oldest-first pages the other way round. A
//! page cursor is the hash of the last transaction returned. If the reverse
//! map resolves it, the cursor points into the index; otherwise it points
//! into the pool.
//!
//! Returned transactions and coins carry token details from the configured
//! [`TokenInfo`] source when it has any.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::IndexingEngine;
use crate::error::{IndexerError, Result};
use crate::indexer::IndexStatus;
use crate::source::{ChainSource, PoolQuery, TokenInfo, UnconfirmedPool};
use crate::store::Direction;
use crate::types::{Address, Coin, Count, Hash256, TxView};

/// Order of an address history listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl ListOrder {
    fn direction(self) -> Direction {
        match self {
            Self::NewestFirst => Direction::Descending,
            Self::OldestFirst => Direction::Ascending,
        }
    }
}

/// Options for [`QueryEngine::list_by_address`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Page size. `None` uses the configured ceiling.
    pub limit: Option<usize>,
    /// Hash of the last transaction of the previous page.
    pub cursor: Option<Hash256>,
    pub order: ListOrder,
}

impl ListOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: Hash256) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = ListOrder::OldestFirst;
        self
    }
}

/// One page of address history.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<TxView>,
    /// Cursor for the next page; `None` when this page was not full.
    pub next_cursor: Option<Hash256>,
}

/// Where a page starts.
enum Resume {
    Start,
    /// After this position in the index.
    Indexed(Count),
    /// After this transaction in the pool.
    Pooled(Hash256),
    /// The cursor is neither indexed nor pooled any more (unwound by a reorg
    /// or evicted): the indexed part of the listing is exhausted.
    Exhausted,
}

pub struct QueryEngine {
    engine: Arc<IndexingEngine>,
    chain: Arc<dyn ChainSource>,
    pool: Arc<dyn UnconfirmedPool>,
    tokens: Arc<dyn TokenInfo>,
    max_page_size: usize,
}

impl QueryEngine {
    pub fn new(
        engine: Arc<IndexingEngine>,
        chain: Arc<dyn ChainSource>,
        pool: Arc<dyn UnconfirmedPool>,
        tokens: Arc<dyn TokenInfo>,
        max_page_size: usize,
    ) -> Self {
        Self {
            engine,
            chain,
            pool,
            tokens,
            max_page_size,
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Full view of an indexed transaction, or `None` if it is not indexed.
    pub async fn lookup_by_hash(&self, hash: &Hash256) -> Result<Option<TxView>> {
        if self.engine.allocator().lookup(hash).await?.is_none() {
            return Ok(None);
        }
        self.materialize(hash).await.map(Some)
    }

    /// One page of token transactions touching `address`.
    pub async fn list_by_address(&self, address: &Address, opts: ListOptions) -> Result<Page> {
        let limit = opts.limit.unwrap_or(self.max_page_size);
        if limit > self.max_page_size {
            return Err(IndexerError::LimitExceeded {
                requested: limit,
                max: self.max_page_size,
            });
        }
        if limit == 0 {
            return Err(IndexerError::InvalidInput("limit must be at least 1".into()));
        }

        let resume = self.resolve_cursor(opts.cursor).await?;
        let order = opts.order;
        let mut items = Vec::with_capacity(limit);

        match order {
            ListOrder::NewestFirst => {
                match resume {
                    Resume::Start => self.fill_from_pool(&mut items, address, None, order, limit).await?,
                    Resume::Pooled(after) => {
                        self.fill_from_pool(&mut items, address, Some(after), order, limit).await?
                    }
                    Resume::Indexed(_) | Resume::Exhausted => {}
                }
                match resume {
                    Resume::Indexed(count) => {
                        self.fill_from_index(&mut items, address, Some(count), order, limit).await?
                    }
                    Resume::Exhausted => {}
                    _ => self.fill_from_index(&mut items, address, None, order, limit).await?,
                }
            }
            ListOrder::OldestFirst => {
                match resume {
                    Resume::Start => self.fill_from_index(&mut items, address, None, order, limit).await?,
                    Resume::Indexed(count) => {
                        self.fill_from_index(&mut items, address, Some(count), order, limit).await?
                    }
                    Resume::Pooled(_) | Resume::Exhausted => {}
                }
                let after = match resume {
                    Resume::Pooled(hash) => Some(hash),
                    _ => None,
                };
                self.fill_from_pool(&mut items, address, after, order, limit).await?;
            }
        }

        let next_cursor = if items.len() == limit {
            items.last().map(TxView::hash)
        } else {
            None
        };
        tracing::debug!(%address, returned = items.len(), ?order, "address history served");
        Ok(Page { items, next_cursor })
    }

    /// Unspent coins of `address`: unconfirmed first, then confirmed coins
    /// that no unconfirmed transaction spends.
    pub async fn coins_by_address(&self, address: &Address) -> Result<Vec<Coin>> {
        let mut coins = self.pool.coins_by_address(address).await?;
        for coin in self.chain.coins_by_address(address).await? {
            if self.pool.spender(&coin.outpoint).await?.is_none() {
                coins.push(coin);
            }
        }
        try_join_all(coins.iter_mut().map(|coin| self.attach_coin_token(coin))).await?;
        Ok(coins)
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        self.engine.status().await
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn resolve_cursor(&self, cursor: Option<Hash256>) -> Result<Resume> {
        let Some(hash) = cursor else {
            return Ok(Resume::Start);
        };
        if let Some(count) = self.engine.addresses().reverse(&hash).await? {
            return Ok(Resume::Indexed(count));
        }
        if self.pool.transaction(&hash).await?.is_some() {
            return Ok(Resume::Pooled(hash));
        }
        tracing::debug!(cursor = %hash, "cursor no longer resolves, indexed part exhausted");
        Ok(Resume::Exhausted)
    }

    async fn fill_from_pool(
        &self,
        items: &mut Vec<TxView>,
        address: &Address,
        after: Option<Hash256>,
        order: ListOrder,
        limit: usize,
    ) -> Result<()> {
        let remaining = limit - items.len();
        if remaining == 0 {
            return Ok(());
        }
        let query = PoolQuery {
            limit: remaining,
            after,
            order,
        };
        let mut pooled = self.pool.list_by_address(address, query).await?;
        pooled.truncate(remaining);
        let views = try_join_all(pooled.into_iter().map(|view| self.with_tokens(view))).await?;
        items.extend(views);
        Ok(())
    }

    async fn fill_from_index(
        &self,
        items: &mut Vec<TxView>,
        address: &Address,
        from: Option<Count>,
        order: ListOrder,
        limit: usize,
    ) -> Result<()> {
        let remaining = limit - items.len();
        if remaining == 0 {
            return Ok(());
        }
        let rows = self
            .engine
            .addresses()
            .range_query(address, from, remaining, order.direction())
            .await?;
        let views = try_join_all(rows.iter().map(|(_, hash)| self.materialize(hash))).await?;
        items.extend(views);
        Ok(())
    }

    async fn materialize(&self, hash: &Hash256) -> Result<TxView> {
        let view = self.chain.transaction(hash).await?.ok_or_else(|| {
            IndexerError::MissingCollaboratorData(format!(
                "indexed transaction {hash} not available from chain source"
            ))
        })?;
        self.with_tokens(view).await
    }

    /// Attach the token record and per-output amounts to `view`, and the
    /// amount of each spent coin.
    async fn with_tokens(&self, mut view: TxView) -> Result<TxView> {
        let records = self.tokens.output_records(&view.hash()).await?;
        // Records without a token id describe types we do not expose.
        if let Some(token_id) = records.first().and_then(|r| r.token_id) {
            view.token = self.tokens.token(&token_id).await?;
            let outputs = view.tx.outputs.len();
            view.output_tokens = records
                .into_iter()
                .filter(|r| (r.vout as usize) < outputs)
                .collect();
            view.output_tokens.sort_by_key(|r| r.vout);
        }
        for coin in view.coins.iter_mut() {
            self.attach_coin_token(coin).await?;
        }
        Ok(view)
    }

    async fn attach_coin_token(&self, coin: &mut Coin) -> Result<()> {
        let records = self.tokens.output_records(&coin.outpoint.hash).await?;
        coin.token = records.into_iter().find(|r| r.vout == coin.outpoint.index);
        Ok(())
    }
}
