//! Error types for the token index.

use thiserror::Error;

/// Errors that can occur while indexing, unwinding, or querying.
///
/// Fatal variants (`MalformedRecord`, `IndexOverflow`, `MissingCollaboratorData`,
/// `Storage`, `Collaborator`) abort the current height's batch, so nothing
/// partial is ever persisted. "Not found" is never an error: lookups return
/// `Option::None`.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Malformed {record} record: {reason}")]
    MalformedRecord { record: &'static str, reason: String },

    #[error("Sequential index overflow: cannot allocate past {last}")]
    IndexOverflow { last: u32 },

    #[error("Missing collaborator data: {0}")]
    MissingCollaboratorData(String),

    #[error("Requested limit {requested} exceeds the page size ceiling of {max}")]
    LimitExceeded { requested: usize, max: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Indexing is suspended: rollback to height {target} in progress")]
    Suspended { target: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Collaborator error in '{collaborator}': {reason}")]
    Collaborator { collaborator: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl IndexerError {
    pub(crate) fn malformed(record: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error leaves persisted state untouched and the
    /// caller may simply retry or correct its input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LimitExceeded { .. } | Self::InvalidInput(_) | Self::Suspended { .. }
        )
    }

    /// Returns `true` if the error signals store corruption or an exhausted
    /// allocator and indexing must halt until an operator intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::IndexOverflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
