//! Error types for sync sessions.

use std::time::Duration;

use peersync_core::{CoreError, DeviceRole, SessionState};
use peersync_store::StoreError;
use peersync_transfer::TransferError;
use thiserror::Error;

use crate::discovery::DiscoveryError;

/// Errors that can end a sync session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The byte-stream exchange failed.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Checkpoint store error outside the transfer itself.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid context input.
    #[error("invalid input: {0}")]
    Core(#[from] CoreError),

    /// Discovery provider error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// No pairing outcome arrived in time.
    #[error("pairing timed out after {0:?}")]
    PairingTimeout(Duration),

    /// The provider reported a failed pairing.
    #[error("pairing failed: {0}")]
    PairingFailed(String),

    /// The stream could not be opened.
    #[error("connect failed after {attempts} attempt(s): {reason}")]
    ConnectFailed { attempts: u32, reason: String },

    /// The peer dropped the link before the session completed.
    #[error("peer disconnected")]
    Disconnected,

    /// The session was cancelled locally.
    #[error("session cancelled")]
    Cancelled,

    /// Another session is already active in this context.
    #[error("a session is already active")]
    Busy,

    /// The context has no data source or sink for this role.
    #[error("context cannot act as {0}")]
    RoleUnavailable(DeviceRole),

    /// The session is not in a state that allows the request.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The transfer worker panicked.
    #[error("transfer worker failed: {0}")]
    Worker(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
