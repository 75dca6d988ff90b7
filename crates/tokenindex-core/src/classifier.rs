//! Relevance classification and address attribution.
//!
//! A transaction is relevant to the index when its own token payload carries
//! the monitored token id (a carrier), or when it does not but spends an
//! output of a transaction that did (a burn).

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Address, CoinView, Hash256, Transaction};

/// Outcome of classifying one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Irrelevant,
    /// The transaction's own payload carries the token.
    Carrier,
    /// The transaction spends token outputs without carrying the token on.
    Burn,
}

impl Relevance {
    pub fn is_relevant(&self) -> bool {
        !matches!(self, Self::Irrelevant)
    }
}

/// Decides relevance and attributes addresses for the indexing engine.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, tx: &Transaction) -> Result<Relevance>;

    /// Addresses touched by `tx`: owners of the spent coins in `view` and
    /// recipients of its outputs, without duplicates, in first-seen order.
    async fn resolve_addresses(&self, tx: &Transaction, view: &CoinView) -> Result<Vec<Address>> {
        Ok(collect_addresses(tx, view))
    }
}

/// Token-protocol collaborator: which token ids a transaction's payload
/// carries.
#[async_trait]
pub trait MarkerIndex: Send + Sync {
    /// `None` if the transaction has no valid token payload.
    async fn markers(&self, hash: &Hash256) -> Result<Option<Vec<Hash256>>>;
}

/// Input owners then output recipients, deduplicated.
pub fn collect_addresses(tx: &Transaction, view: &CoinView) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let inputs = tx
        .inputs
        .iter()
        .filter_map(|input| view.get(&input.prevout))
        .filter_map(|coin| coin.address.as_ref());
    let outputs = tx.outputs.iter().filter_map(|output| output.address.as_ref());
    for address in inputs.chain(outputs) {
        if seen.insert(address) {
            out.push(address.clone());
        }
    }
    out
}

// ─── MarkerClassifier ─────────────────────────────────────────────────────────

/// Classifies by looking up token markers for a single monitored token id.
pub struct MarkerClassifier {
    markers: Arc<dyn MarkerIndex>,
    token_id: Hash256,
}

impl MarkerClassifier {
    pub fn new(markers: Arc<dyn MarkerIndex>, token_id: Hash256) -> Self {
        Self { markers, token_id }
    }

    pub fn token_id(&self) -> &Hash256 {
        &self.token_id
    }

    async fn carries(&self, hash: &Hash256) -> Result<bool> {
        Ok(self
            .markers
            .markers(hash)
            .await?
            .map_or(false, |ids| ids.contains(&self.token_id)))
    }
}

#[async_trait]
impl Classifier for MarkerClassifier {
    async fn classify(&self, tx: &Transaction) -> Result<Relevance> {
        if self.carries(&tx.hash).await? {
            return Ok(Relevance::Carrier);
        }

        // Each source transaction is checked once, however many of its
        // outputs are spent here.
        let mut checked = HashSet::new();
        for input in &tx.inputs {
            let source = input.prevout.hash;
            if input.prevout.is_null() || !checked.insert(source) {
                continue;
            }
            if self.carries(&source).await? {
                tracing::debug!(tx = %tx.hash, source = %source, "token burn detected");
                return Ok(Relevance::Burn);
            }
        }
        Ok(Relevance::Irrelevant)
    }
}
