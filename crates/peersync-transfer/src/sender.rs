//! Outbound side of a sync session.
//!
//! The sender drains its collections in ascending `sync_order`. Each
//! non-empty page produces a manifest followed by one chunk. An empty page
//! exhausts the collection without touching the wire. Once every collection
//! is exhausted a terminal manifest ends the session.
//!
//! Every chunk and the terminal manifest wait for the receiver's
//! acknowledgement before the sender moves on.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use peersync_core::{
    checkpoint_seed, CheckpointEntry, CheckpointSeed, CollectionSet, Manifest, RecordCount,
    TerminalOutcome,
};

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::frame::{FrameReader, FrameWriter};
use crate::progress::ProgressReporter;
use crate::source::SenderDataSource;

/// Latch set once the receiver has acknowledged the terminal manifest.
///
/// The session checks it when the transport drops: a disconnect after
/// completion is a normal end, not a failure.
#[derive(Debug, Clone, Default)]
pub struct SyncCompletion {
    inner: Arc<Mutex<Option<TerminalOutcome>>>,
}

impl SyncCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, outcome: TerminalOutcome) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// What the sender puts on the wire next.
#[derive(Debug, Clone, PartialEq)]
pub enum SenderStep {
    /// A manifest and the chunk it describes.
    Batch { manifest: Manifest, payload: Bytes },
    /// The terminal manifest. Nothing follows it.
    Finished {
        manifest: Manifest,
        outcome: TerminalOutcome,
    },
}

/// Per-session sender state.
pub struct SenderEngine<D: ?Sized> {
    source: Arc<D>,
    config: TransferConfig,
    /// Collection name to last record id the receiver already holds.
    remaining_checkpoints: CheckpointSeed,
    /// Shrinks from the front as collections are exhausted.
    pending: CollectionSet,
    record_count: RecordCount,
    batch_offset: usize,
    total_sent_records: i64,
    batches_emitted: u64,
    finished: Option<TerminalOutcome>,
    completion: SyncCompletion,
}

impl<D: SenderDataSource + ?Sized> SenderEngine<D> {
    /// Seed checkpoints from the receiver's history and fix the record count.
    pub async fn prepare(
        source: Arc<D>,
        history: &[CheckpointEntry],
        config: TransferConfig,
    ) -> Result<Self> {
        let pending = source.collections().await.map_err(TransferError::Source)?;
        let remaining_checkpoints = checkpoint_seed(&pending, history);
        let record_count = source
            .total_record_count(&remaining_checkpoints)
            .await
            .map_err(TransferError::Source)?;

        tracing::debug!(
            collections = pending.len(),
            total_records = record_count.total_record_count,
            "sender prepared"
        );

        Ok(Self {
            source,
            config,
            remaining_checkpoints,
            pending,
            record_count,
            batch_offset: 0,
            total_sent_records: 0,
            batches_emitted: 0,
            finished: None,
            completion: SyncCompletion::new(),
        })
    }

    /// Share the completion latch with the session driving this engine.
    pub fn with_completion(mut self, completion: SyncCompletion) -> Self {
        self.completion = completion;
        self
    }

    pub fn record_count(&self) -> &RecordCount {
        &self.record_count
    }

    pub fn remaining_checkpoints(&self) -> &CheckpointSeed {
        &self.remaining_checkpoints
    }

    pub fn total_sent_records(&self) -> i64 {
        self.total_sent_records
    }

    pub fn completion(&self) -> &SyncCompletion {
        &self.completion
    }

    /// Produce the next thing to send.
    ///
    /// Empty pages are consumed here. Once finished, every call returns the
    /// same terminal step.
    pub async fn next_step(&mut self) -> Result<SenderStep> {
        if let Some(outcome) = self.finished {
            return Ok(self.terminal(outcome));
        }

        let limit = self.config.batch_size.max(1);
        loop {
            let Some(collection) = self.pending.first().cloned() else {
                let outcome = if self.batches_emitted == 0 {
                    TerminalOutcome::DataUpToDate
                } else {
                    TerminalOutcome::TransferComplete
                };
                self.finished = Some(outcome);
                return Ok(self.terminal(outcome));
            };

            let after_id = self
                .remaining_checkpoints
                .get(&collection.name)
                .copied()
                .unwrap_or(0);
            let page = self
                .source
                .page(&collection, after_id, limit, self.batch_offset)
                .await
                .map_err(TransferError::Source)?;

            if page.is_empty() {
                tracing::debug!(collection = %collection.name, "collection exhausted");
                self.pending.pop_first();
                self.batch_offset = 0;
                continue;
            }

            if !page.records.fits(collection.content_kind) {
                return Err(TransferError::Source(anyhow!(
                    "page for {} does not match content kind {:?}",
                    collection.name,
                    collection.content_kind
                )));
            }

            let payload = page.records.encode()?;
            let count = page.records.len();
            self.batch_offset += count;
            self.batches_emitted += 1;

            tracing::trace!(
                collection = %collection.name,
                records = count,
                bytes = payload.len(),
                highest_id = page.highest_id,
                "batch ready"
            );

            let manifest = Manifest::batch(
                &collection,
                count as i64,
                payload.len() as i64,
                &self.record_count,
            );
            return Ok(SenderStep::Batch { manifest, payload });
        }
    }

    /// Account for a batch the receiver acknowledged.
    pub fn record_sent(&mut self, records: i64) {
        self.total_sent_records = self.total_sent_records.saturating_add(records);
    }

    /// Drive the whole outbound exchange.
    pub async fn run<R, W>(
        &mut self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
        progress: &ProgressReporter,
    ) -> Result<TerminalOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        progress.start(self.record_count.total_record_count);

        loop {
            match self.next_step().await? {
                SenderStep::Batch { manifest, payload } => {
                    writer.write_manifest(&manifest).await?;
                    writer.write_bytes(&payload).await?;
                    reader.read_ready().await?;
                    self.record_sent(manifest.record_count);
                    progress.advance(manifest.record_count);
                }
                SenderStep::Finished { manifest, outcome } => {
                    writer.write_manifest(&manifest).await?;
                    reader.read_ready().await?;
                    self.completion.mark(outcome);
                    tracing::info!(
                        outcome = ?outcome,
                        sent = self.total_sent_records,
                        "sender finished"
                    );
                    return Ok(outcome);
                }
            }
        }
    }

    fn terminal(&self, outcome: TerminalOutcome) -> SenderStep {
        SenderStep::Finished {
            manifest: Manifest::terminal(outcome, &self.record_count),
            outcome,
        }
    }
}
