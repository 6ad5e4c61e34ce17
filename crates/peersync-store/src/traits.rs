//! CheckpointStore trait: the abstract interface for checkpoint persistence.

use async_trait::async_trait;
use peersync_core::{AppLifetimeKey, CheckpointEntry};

use crate::error::Result;

/// Result of upserting a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// No entry existed for the key; one was created.
    Inserted,
    /// An existing entry was overwritten.
    Updated,
}

/// Async interface for per-peer, per-collection checkpoints.
///
/// All methods are async to support both blocking (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to keep the runtime free.
///
/// # Design Notes
///
/// - Entries are unique by `(sending_peer_key, collection_name)`.
/// - `upsert` overwrites unconditionally; the caller decides what value is correct.
/// - `release` is invoked on every terminal session transition, including errors.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// All checkpoints recorded for a sending peer, ordered by collection name.
    async fn get_history(&self, peer: &AppLifetimeKey) -> Result<Vec<CheckpointEntry>>;

    /// The checkpoint for one collection from one peer.
    async fn get(
        &self,
        peer: &AppLifetimeKey,
        collection_name: &str,
    ) -> Result<Option<CheckpointEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the entry if absent, else overwrite its record id.
    async fn upsert(&self, entry: &CheckpointEntry) -> Result<UpsertResult>;

    /// Remove every checkpoint for a peer. Returns the number of entries removed.
    async fn clear(&self, peer: &AppLifetimeKey) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Flush and release resources held on behalf of a finished session.
    ///
    /// The store stays usable afterwards.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}
