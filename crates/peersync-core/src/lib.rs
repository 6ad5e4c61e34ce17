//! # peersync Core
//!
//! Pure data model for peer-to-peer incremental record sync.
//!
//! This crate contains no I/O, no storage, no networking. It describes what
//! flows between two peers and what a session may be doing at any point.
//!
//! ## Key Types
//!
//! - [`CollectionDescriptor`] / [`CollectionSet`] - Typed record collections, drained in `sync_order`
//! - [`Manifest`] - Control message preceding each chunk (or standing alone as a terminal marker)
//! - [`RecordCount`] - Records owed for a session, fixed once computed
//! - [`CheckpointEntry`] - Last processed record per `(sending peer, collection)`
//! - [`TransferProgress`] - Derived percentage-complete
//! - [`SessionState`] - Lifecycle of a single sync session
//!
//! ## Terminal markers
//!
//! Two reserved collection names end a session: [`SYNC_COMPLETE`] when the
//! sender has nothing more to send, [`DATA_UP_TO_DATE`] when nothing was owed
//! in the first place. Hosts may not register collections under these names.

pub mod collection;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod progress;
pub mod record;
pub mod state;

pub use collection::{CollectionDescriptor, CollectionSet, ContentKind};
pub use error::{CoreError, Result};
pub use identity::{AppLifetimeKey, DeviceDetails};
pub use manifest::{Manifest, ManifestKind, DATA_UP_TO_DATE, SYNC_COMPLETE};
pub use progress::{divide_to_percent, TransferProgress};
pub use record::{checkpoint_seed, CheckpointEntry, CheckpointSeed, RecordCount, RecordId};
pub use state::{DeviceRole, SessionState, TerminalOutcome};
