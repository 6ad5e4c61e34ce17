//! # peersync Transfer
//!
//! The byte-stream protocol between a sending and a receiving peer.
//!
//! ## Overview
//!
//! A session runs over one reliable duplex stream:
//!
//! 1. **Handshake**: the sender announces its identity; the receiver replies
//!    with the checkpoints it holds for that sender.
//! 2. **Transfer**: the sender drains its collections in `sync_order`,
//!    writing a manifest followed by one chunk per page.
//! 3. **Terminal**: a `SYNC_COMPLETE` or `DATA_UP_TO_DATE` manifest ends it.
//!
//! The stream is single-flight. One manifest/chunk exchange completes before
//! the next begins.
//!
//! ## Key Types
//!
//! - [`FrameWriter`] / [`FrameReader`] - Tagged `MANIFEST`, `STRING` and `BYTES` frames
//! - [`SenderEngine`] - Pages records out of a [`SenderDataSource`]
//! - [`ReceiverEngine`] - Applies chunks to a [`ReceiverDataSink`] and checkpoints them
//! - [`ProgressReporter`] - Live [`TransferProgress`](peersync_core::TransferProgress) for observers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peersync_transfer::{handshake, FramedStream, ProgressReporter, SenderEngine};
//!
//! let mut framed = FramedStream::new(stream, &config);
//! let (reader, writer) = framed.split_mut();
//! let history = handshake::initiate(reader, writer, &details).await?;
//!
//! let mut engine = SenderEngine::prepare(source, &history, config).await?;
//! let outcome = engine.run(writer, &ProgressReporter::new()).await?;
//! framed.close().await?;
//! ```
//!
//! ## Design Notes
//!
//! - **No retries**: any stream error ends the session; reconnecting is the caller's job
//! - **Apply before checkpoint**: a batch the sink rejects never advances a checkpoint
//! - **Boundary +1**: a fully received collection is checkpointed one past its last record

pub mod batch;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod source;

pub use batch::{BinaryRecord, RecordBatch};
pub use config::TransferConfig;
pub use error::{Result, TransferError};
pub use frame::{limits, Frame, FrameReader, FrameTag, FrameWriter, FramedStream};
pub use progress::ProgressReporter;
pub use receiver::{ManifestAction, ReceiverEngine};
pub use sender::{SenderEngine, SenderStep, SyncCompletion};
pub use source::{ReceiverDataSink, RecordPage, SenderDataSource};
