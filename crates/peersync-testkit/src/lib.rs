//! # peersync testkit
//!
//! Testing utilities for peersync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a sender and a receiver paired over in-memory discovery
//! - **Generators**: Proptest strategies for multi-collection sync scenarios
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use peersync_testkit::{group_patient_source, SyncPair};
//!
//! let mut pair = SyncPair::new(group_patient_source());
//! let (sent, received) = pair.run().await;
//! assert_eq!(pair.checkpoint("Patient").await, Some(13));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use peersync_testkit::generators::{source_for, sync_plan};
//!
//! proptest! {
//!     #[test]
//!     fn every_owed_record_arrives(plans in sync_plan(4)) {
//!         let source = source_for(&plans);
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{fast_config, group_patient_source, init_tracing, SlowSink, SlowSource, SyncPair};
pub use generators::{source_for, sync_plan, CollectionPlan};
