//! Host notification interface and dispatcher.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::ConnectedBlock;

/// Receives the host's chain notifications.
///
/// The host calls these serially, in chain order: connects ascend, and
/// disconnects descend from the tip.
#[async_trait]
pub trait ChainListener: Send + Sync {
    async fn on_block_connected(&self, block: &ConnectedBlock) -> Result<()>;

    async fn on_block_disconnected(&self, block: &ConnectedBlock) -> Result<()>;

    /// The host rewound its chain to `height`; drop everything above it.
    async fn on_reset(&self, height: u32) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Fans host notifications out to every registered listener, in
/// registration order. The first failure stops the dispatch.
#[derive(Default)]
pub struct HostAdapter {
    listeners: Vec<Arc<dyn ChainListener>>,
}

impl HostAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn ChainListener>) {
        tracing::debug!(listener = listener.name(), "listener registered");
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn block_connected(&self, block: &ConnectedBlock) -> Result<()> {
        for listener in &self.listeners {
            listener.on_block_connected(block).await.map_err(|e| {
                tracing::error!(listener = listener.name(), height = block.height, error = %e, "connect failed");
                e
            })?;
        }
        Ok(())
    }

    pub async fn block_disconnected(&self, block: &ConnectedBlock) -> Result<()> {
        for listener in &self.listeners {
            listener.on_block_disconnected(block).await.map_err(|e| {
                tracing::error!(listener = listener.name(), height = block.height, error = %e, "disconnect failed");
                e
            })?;
        }
        Ok(())
    }

    pub async fn reset(&self, height: u32) -> Result<()> {
        for listener in &self.listeners {
            listener.on_reset(height).await?;
        }
        Ok(())
    }
}
