//! Error types for the core data model.

use thiserror::Error;

use crate::state::SessionState;

/// Errors raised while constructing or validating core values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Two collections share a name.
    #[error("duplicate collection name: {0}")]
    DuplicateCollection(String),

    /// A collection used one of the terminal marker names.
    #[error("collection name is reserved: {0}")]
    ReservedCollectionName(String),

    /// A manifest failed structural validation.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Device identity is missing or malformed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// A state change not permitted by the session lifecycle.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
