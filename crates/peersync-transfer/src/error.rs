//! Error types for the transfer protocol.

use thiserror::Error;

use peersync_core::CoreError;
use peersync_store::StoreError;

/// Errors that end a transfer. Every variant is fatal to the session.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Stream read/write failure, including the peer closing mid-frame.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Unexpected tag, malformed manifest, or a chunk that does not match its manifest.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The data sink rejected a batch. No checkpoint was written for it.
    #[error("failed to apply batch for {collection}: {reason:#}")]
    Apply {
        collection: String,
        reason: anyhow::Error,
    },

    /// The sender's data source failed.
    #[error("data source error: {0:#}")]
    Source(anyhow::Error),

    /// Checkpoint store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn violation(message: impl Into<String>) -> Self {
        TransferError::ProtocolViolation(message.into())
    }
}

impl From<CoreError> for TransferError {
    fn from(err: CoreError) -> Self {
        TransferError::ProtocolViolation(err.to_string())
    }
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
