//! # peersync
//!
//! Peer-to-peer incremental record sync between two devices.
//!
//! ## Overview
//!
//! One device (the sender) pushes the records of several typed collections
//! to another (the receiver) over a single reliable byte stream. The
//! receiver checkpoints what it applied, per sending installation and
//! collection, so the next session resumes where this one stopped.
//!
//! This crate ties the pieces into a session lifecycle:
//!
//! - **Discovery**: a [`TransportDiscoveryProvider`] finds peers, pairs, and opens the stream
//! - **Session**: a [`Session`] walks the [`SessionState`] machine for one role
//! - **Context**: a [`SyncContext`] carries identity, store and data adapters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use peersync::discovery::memory::MemoryDiscovery;
//! use peersync::{PeerRef, Session, SyncContext};
//! use peersync::core::{AppLifetimeKey, DeviceDetails};
//! use peersync::store::SqliteCheckpointStore;
//! use peersync::transfer::source::memory::MemorySink;
//!
//! async fn example() {
//!     let (_sender_side, receiver_side) =
//!         MemoryDiscovery::pair(PeerRef::new("a", "Tablet A"), PeerRef::new("b", "Tablet B"));
//!
//!     let store = SqliteCheckpointStore::open("checkpoints.db").unwrap();
//!     let context = SyncContext::builder(
//!         DeviceDetails::new(AppLifetimeKey::generate(), "tablet-b"),
//!         Arc::new(store),
//!     )
//!     .sink(Arc::new(MemorySink::new()))
//!     .build()
//!     .unwrap();
//!
//!     let mut session = Session::new(context, Arc::new(receiver_side));
//!     let report = session.receive().await.unwrap();
//!     println!("received {} records", report.records_transferred);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `peersync::core` - Data model (manifests, checkpoints, states)
//! - `peersync::store` - Checkpoint persistence
//! - `peersync::transfer` - Framing, handshake and sync engines

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod session;

// Re-export component crates
pub use peersync_core as core;
pub use peersync_store as store;
pub use peersync_transfer as transfer;

pub use config::SessionConfig;
pub use context::{SyncContext, SyncContextBuilder};
pub use discovery::{
    ConnectionInfo, DiscoveryError, Link, PairingEvent, PeerRef, TransportDiscoveryProvider,
};
pub use error::{Result, SessionError};
pub use session::{Session, SessionHandle, SessionReport};

pub use peersync_core::{DeviceRole, SessionState, TerminalOutcome, TransferProgress};
