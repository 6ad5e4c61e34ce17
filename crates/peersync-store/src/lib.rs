//! # peersync Store
//!
//! Checkpoint persistence for the receiving side of a sync session.
//!
//! ## Overview
//!
//! The receiver records, per sending peer and collection, the highest record
//! id it has durably applied. The next session asks for everything after that
//! mark. Storage sits behind the [`CheckpointStore`] trait so hosts can plug in
//! whatever embedded store they already ship; [`SqliteCheckpointStore`] is the
//! default and [`MemoryCheckpointStore`] backs tests.
//!
//! ## Key Types
//!
//! - [`CheckpointStore`] - Async trait for checkpoint operations
//! - [`SqliteCheckpointStore`] - SQLite-backed persistent store
//! - [`MemoryCheckpointStore`] - In-memory store for tests
//! - [`UpsertResult`] - Whether an upsert created or overwrote an entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use peersync_core::{AppLifetimeKey, CheckpointEntry};
//! use peersync_store::{CheckpointStore, SqliteCheckpointStore};
//!
//! async fn example() {
//!     let store = SqliteCheckpointStore::open("checkpoints.db").unwrap();
//!
//!     let peer = AppLifetimeKey::new("3f2a9c").unwrap();
//!     store
//!         .upsert(&CheckpointEntry::new(peer.clone(), "Patient", 13))
//!         .await
//!         .unwrap();
//!
//!     let history = store.get_history(&peer).await.unwrap();
//!     assert_eq!(history.len(), 1);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Primary key**: `(sending_peer_key, collection_name)`
//! - **Writer**: only the receiver engine writes, and only after a batch applied
//! - **Stable keys**: entries are keyed by app lifetime key, never by connection handle

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use traits::{CheckpointStore, UpsertResult};
