//! Fluent builder API for assembling a [`TokenIndexer`].
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tokenindex_core::classifier::MarkerIndex;
//! # use tokenindex_core::source::ChainSource;
//! use tokenindex_core::{IndexerBuilder, MemoryStore};
//!
//! # fn example(markers: Arc<dyn MarkerIndex>, chain: Arc<dyn ChainSource>) -> tokenindex_core::error::Result<()> {
//! let indexer = IndexerBuilder::new()
//!     .id("token")
//!     .activation_height(866_600)
//!     .token_id("7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e".parse()?)
//!     .store(Arc::new(MemoryStore::new()))
//!     .markers(markers)
//!     .chain(chain)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::classifier::{Classifier, MarkerClassifier, MarkerIndex};
use crate::codec::KeySchema;
use crate::engine::IndexingEngine;
use crate::error::{IndexerError, Result};
use crate::indexer::{IndexerConfig, TokenIndexer};
use crate::query::QueryEngine;
use crate::source::{ChainSource, NoopPool, NoopTokenInfo, TokenInfo, UnconfirmedPool};
use crate::store::KvStore;
use crate::types::Hash256;

/// Fluent builder for [`TokenIndexer`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    store: Option<Arc<dyn KvStore>>,
    classifier: Option<Arc<dyn Classifier>>,
    markers: Option<Arc<dyn MarkerIndex>>,
    chain: Option<Arc<dyn ChainSource>>,
    pool: Option<Arc<dyn UnconfirmedPool>>,
    tokens: Option<Arc<dyn TokenInfo>>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration.
    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the first height that may contain the token.
    pub fn activation_height(mut self, height: u32) -> Self {
        self.config.activation_height = height;
        self
    }

    /// Set the page size ceiling for address listings.
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Set the monitored token id.
    pub fn token_id(mut self, token_id: Hash256) -> Self {
        self.config.token_id = Some(token_id);
        self
    }

    /// Override the namespace bytes of the persisted layout.
    pub fn schema(mut self, schema: KeySchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom classifier instead of marker lookups.
    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Classify through `markers` for the configured token id.
    pub fn markers(mut self, markers: Arc<dyn MarkerIndex>) -> Self {
        self.markers = Some(markers);
        self
    }

    pub fn chain(mut self, chain: Arc<dyn ChainSource>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Defaults to an always-empty pool.
    pub fn pool(mut self, pool: Arc<dyn UnconfirmedPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Source of token records attached to query results. Defaults to none.
    pub fn token_info(mut self, tokens: Arc<dyn TokenInfo>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the configuration only.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and wire up the engines.
    pub fn build(self) -> Result<TokenIndexer> {
        self.config.validate()?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let chain = self.chain.ok_or_else(|| missing("chain source"))?;
        let pool = self.pool.unwrap_or_else(|| Arc::new(NoopPool));
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(NoopTokenInfo));
        let classifier = match (self.classifier, self.markers) {
            (Some(classifier), _) => classifier,
            (None, Some(markers)) => {
                let token_id = self.config.token_id.ok_or_else(|| {
                    IndexerError::Config("token_id is required to classify by markers".into())
                })?;
                Arc::new(MarkerClassifier::new(markers, token_id)) as Arc<dyn Classifier>
            }
            (None, None) => return Err(missing("classifier or marker index")),
        };

        let schema = Arc::new(self.config.schema.clone());
        let engine = Arc::new(IndexingEngine::new(
            store,
            schema,
            classifier,
            chain.clone(),
            self.config.activation_height,
        ));
        let query = QueryEngine::new(engine.clone(), chain, pool, tokens, self.config.max_page_size);
        Ok(TokenIndexer::new(self.config, engine, query))
    }
}

fn missing(what: &str) -> IndexerError {
    IndexerError::Config(format!("{what} not set"))
}
