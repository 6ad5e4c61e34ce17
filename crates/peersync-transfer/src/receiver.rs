//! Inbound side of a sync session.
//!
//! The receiver alternates between reading a manifest and, for batch
//! manifests, reading exactly one chunk. A chunk is applied to the sink and
//! only then checkpointed; a failed apply leaves the checkpoint untouched.
//! The receiver acknowledges each checkpointed chunk, and the terminal
//! manifest, so the sender never runs ahead of what has been stored.
//!
//! Checkpoints store one past the last record of a collection once it is
//! fully received in this session. Resumption filters strictly greater than
//! the checkpoint, so the boundary record is never requested again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use peersync_core::{AppLifetimeKey, CheckpointEntry, Manifest, ManifestKind, TerminalOutcome};
use peersync_store::CheckpointStore;

use crate::batch::RecordBatch;
use crate::error::{Result, TransferError};
use crate::frame::{FrameReader, FrameWriter};
use crate::progress::ProgressReporter;
use crate::source::ReceiverDataSink;

/// What the receiver does after a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestAction {
    /// Read exactly one chunk next.
    ExpectChunk,
    /// The session is over.
    Complete(TerminalOutcome),
}

/// Per-session receiver state.
pub struct ReceiverEngine<K: ?Sized, S: ?Sized> {
    sink: Arc<K>,
    store: Arc<S>,
    sending_peer: AppLifetimeKey,
    current_manifest: Option<Manifest>,
    /// First non-zero total seen across manifests.
    total_record_count: i64,
    total_received_records: i64,
    per_collection_received: BTreeMap<String, i64>,
    /// Collections whose boundary adjustment has already been applied.
    completed_collections: BTreeSet<String>,
    outcome: Option<TerminalOutcome>,
}

impl<K, S> ReceiverEngine<K, S>
where
    K: ReceiverDataSink + ?Sized,
    S: CheckpointStore + ?Sized,
{
    pub fn new(sink: Arc<K>, store: Arc<S>, sending_peer: AppLifetimeKey) -> Self {
        Self {
            sink,
            store,
            sending_peer,
            current_manifest: None,
            total_record_count: 0,
            total_received_records: 0,
            per_collection_received: BTreeMap::new(),
            completed_collections: BTreeSet::new(),
            outcome: None,
        }
    }

    pub fn sending_peer(&self) -> &AppLifetimeKey {
        &self.sending_peer
    }

    pub fn total_record_count(&self) -> i64 {
        self.total_record_count
    }

    pub fn total_received_records(&self) -> i64 {
        self.total_received_records
    }

    /// Records received for `collection` in this session.
    pub fn received_for(&self, collection: &str) -> i64 {
        self.per_collection_received
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        self.outcome
    }

    /// Interpret a manifest read off the wire.
    pub fn on_manifest(
        &mut self,
        manifest: Manifest,
        progress: &ProgressReporter,
    ) -> Result<ManifestAction> {
        if let Some(outcome) = self.outcome {
            return Err(TransferError::violation(format!(
                "manifest for {} after session ended with {:?}",
                manifest.collection_name, outcome
            )));
        }
        if let Some(pending) = &self.current_manifest {
            return Err(TransferError::violation(format!(
                "manifest for {} while chunk for {} is pending",
                manifest.collection_name, pending.collection_name
            )));
        }

        if self.total_record_count == 0 && manifest.total_record_count > 0 {
            self.total_record_count = manifest.total_record_count;
            progress.start(self.total_record_count);
        }

        match manifest.kind() {
            ManifestKind::Terminal(outcome) => {
                self.outcome = Some(outcome);
                tracing::info!(
                    outcome = ?outcome,
                    received = self.total_received_records,
                    "receiver finished"
                );
                Ok(ManifestAction::Complete(outcome))
            }
            ManifestKind::Batch => {
                tracing::trace!(
                    collection = %manifest.collection_name,
                    records = manifest.record_count,
                    bytes = manifest.payload_byte_size,
                    "manifest received"
                );
                self.current_manifest = Some(manifest);
                Ok(ManifestAction::ExpectChunk)
            }
        }
    }

    /// Apply the chunk announced by the current manifest and checkpoint it.
    pub async fn on_chunk(
        &mut self,
        payload: Bytes,
        progress: &ProgressReporter,
    ) -> Result<CheckpointEntry> {
        let manifest = self
            .current_manifest
            .take()
            .ok_or_else(|| TransferError::violation("chunk without a manifest"))?;
        let collection = manifest.collection_name.as_str();

        if payload.len() as i64 != manifest.payload_byte_size {
            return Err(TransferError::violation(format!(
                "chunk for {} is {} bytes, manifest announced {}",
                collection,
                payload.len(),
                manifest.payload_byte_size
            )));
        }

        let batch = RecordBatch::decode(manifest.content_kind, payload)?;
        let received = batch.len() as i64;
        if received != manifest.record_count {
            return Err(TransferError::violation(format!(
                "chunk for {} holds {} records, manifest announced {}",
                collection, received, manifest.record_count
            )));
        }

        let mut highest_id = self
            .sink
            .apply(collection, batch)
            .await
            .map_err(|reason| TransferError::Apply {
                collection: collection.to_string(),
                reason,
            })?;

        self.total_received_records = self.total_received_records.saturating_add(received);
        progress.advance(received);

        let so_far = self
            .per_collection_received
            .entry(collection.to_string())
            .or_insert(0);
        *so_far += received;

        if manifest.expected_total_for(collection) == Some(*so_far)
            && self.completed_collections.insert(collection.to_string())
        {
            highest_id += 1;
            tracing::debug!(collection, checkpoint = highest_id, "collection fully received");
        }

        let entry = CheckpointEntry::new(self.sending_peer.clone(), collection, highest_id);
        self.store.upsert(&entry).await?;
        Ok(entry)
    }

    /// Drive the whole inbound exchange until a terminal manifest.
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
        loop {
            let manifest = reader.read_manifest().await?;
            match self.on_manifest(manifest, progress)? {
                ManifestAction::ExpectChunk => {
                    let payload = reader.read_chunk().await?;
                    self.on_chunk(payload, progress).await?;
                    writer.write_ready().await?;
                }
                ManifestAction::Complete(outcome) => {
                    writer.write_ready().await?;
                    return Ok(outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::frame::FrameWriter;
    use crate::sender::SenderEngine;
    use crate::source::memory::{MemorySink, MemorySource};
    use peersync_core::{CollectionDescriptor, RecordCount};
    use peersync_store::MemoryCheckpointStore;
    use proptest::prelude::*;

    fn peer() -> AppLifetimeKey {
        AppLifetimeKey::new("sender").unwrap()
    }

    fn engine() -> (
        ReceiverEngine<MemorySink, MemoryCheckpointStore>,
        Arc<MemorySink>,
        Arc<MemoryCheckpointStore>,
    ) {
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = ReceiverEngine::new(sink.clone(), store.clone(), peer());
        (engine, sink, store)
    }

    fn json_chunk(collection: &str, ids: &[i64], totals: &RecordCount) -> (Manifest, Bytes) {
        let batch = RecordBatch::Json(
            ids.iter()
                .map(|id| serde_json::json!({ "id": id }))
                .collect(),
        );
        let payload = batch.encode().unwrap();
        let manifest = Manifest::batch(
            &CollectionDescriptor::json(collection, 0),
            ids.len() as i64,
            payload.len() as i64,
            totals,
        );
        (manifest, payload)
    }

    /// Run a sender and receiver against each other over an in-process pipe.
    async fn sync(
        source: Arc<MemorySource>,
        sink: Arc<MemorySink>,
        store: Arc<MemoryCheckpointStore>,
    ) -> Result<TerminalOutcome> {
        let history = store.get_history(&peer()).await?;
        let (ours, theirs) = tokio::io::duplex(4096);

        let mut sender = SenderEngine::prepare(source, &history, TransferConfig::default()).await?;
        let send = tokio::spawn(async move {
            let (read_half, write_half) = tokio::io::split(ours);
            let mut reader = FrameReader::new(read_half);
            let mut writer = FrameWriter::new(write_half);
            sender
                .run(&mut reader, &mut writer, &ProgressReporter::new())
                .await
        });

        let (read_half, write_half) = tokio::io::split(theirs);
        let mut receiver = ReceiverEngine::new(sink, store, peer());
        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);
        let outcome = receiver
            .run(&mut reader, &mut writer, &ProgressReporter::new())
            .await?;
        send.await.map_err(|e| TransferError::violation(e.to_string()))??;
        Ok(outcome)
    }

    #[tokio::test]
    async fn test_group_patient_checkpoint_one_past_last() {
        let source = Arc::new(
            MemorySource::new()
                .with_collection(CollectionDescriptor::json("Group", 0))
                .with_json_records(CollectionDescriptor::json("Patient", 1), [10, 11, 12]),
        );
        let sink = Arc::new(MemorySink::new());
        let store = Arc::new(MemoryCheckpointStore::with_entries([CheckpointEntry::new(
            peer(),
            "Patient",
            9,
        )]));

        let outcome = sync(source.clone(), sink.clone(), store.clone()).await.unwrap();
        assert_eq!(outcome, TerminalOutcome::TransferComplete);
        assert_eq!(sink.applied_ids("Patient"), vec![10, 11, 12]);

        let patient = store.get(&peer(), "Patient").await.unwrap().unwrap();
        assert_eq!(patient.last_processed_record_id, 13);
        assert!(store.get(&peer(), "Group").await.unwrap().is_none());

        // A second session owes nothing.
        let again = sync(source, sink.clone(), store).await.unwrap();
        assert_eq!(again, TerminalOutcome::DataUpToDate);
        assert_eq!(sink.applied_count(), 3);
    }

    #[tokio::test]
    async fn test_apply_failure_writes_no_checkpoint() {
        let (mut engine, sink, store) = engine();
        sink.fail_collection("Patient");
        let progress = ProgressReporter::new();

        let totals = RecordCount::from_per_collection([("Patient".to_string(), 2)]);
        let (manifest, payload) = json_chunk("Patient", &[1, 2], &totals);
        engine.on_manifest(manifest, &progress).unwrap();

        let err = engine.on_chunk(payload, &progress).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Apply { ref collection, .. } if collection == "Patient"
        ));
        assert!(store.is_empty());
        assert_eq!(progress.current().transferred_records, 0);
    }

    #[tokio::test]
    async fn test_stream_closed_after_manifest_writes_no_checkpoint() {
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 2)]);
        let (manifest, _) = json_chunk("Patient", &[1, 2], &totals);

        let mut writer = FrameWriter::new(Vec::new());
        writer.write_manifest(&manifest).await.unwrap();
        let wire = writer.into_inner();

        let (mut engine, sink, store) = engine();
        let mut reader = FrameReader::new(wire.as_slice());
        let mut answers = FrameWriter::new(Vec::new());
        let err = engine
            .run(&mut reader, &mut answers, &ProgressReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Transport(_)));
        assert!(store.is_empty());
        assert_eq!(sink.applied_count(), 0);
        assert!(answers.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledges_after_checkpoint_and_terminal() {
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 2)]);
        let (manifest, payload) = json_chunk("Patient", &[1, 2], &totals);

        let mut writer = FrameWriter::new(Vec::new());
        writer.write_manifest(&manifest).await.unwrap();
        writer.write_bytes(&payload).await.unwrap();
        writer
            .write_manifest(&Manifest::terminal(TerminalOutcome::TransferComplete, &totals))
            .await
            .unwrap();
        let wire = writer.into_inner();

        let (mut engine, _sink, store) = engine();
        let mut reader = FrameReader::new(wire.as_slice());
        let mut answers = FrameWriter::new(Vec::new());
        let outcome = engine
            .run(&mut reader, &mut answers, &ProgressReporter::new())
            .await
            .unwrap();
        assert_eq!(outcome, TerminalOutcome::TransferComplete);
        assert_eq!(store.len(), 1);

        let answers = answers.into_inner();
        let mut answers = FrameReader::new(answers.as_slice());
        answers.read_ready().await.unwrap();
        answers.read_ready().await.unwrap();
        assert!(answers.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_chunk_is_not_acknowledged() {
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 1)]);
        let (manifest, payload) = json_chunk("Patient", &[1], &totals);

        let mut writer = FrameWriter::new(Vec::new());
        writer.write_manifest(&manifest).await.unwrap();
        writer.write_bytes(&payload).await.unwrap();
        let wire = writer.into_inner();

        let (mut engine, sink, _store) = engine();
        sink.fail_collection("Patient");
        let mut reader = FrameReader::new(wire.as_slice());
        let mut answers = FrameWriter::new(Vec::new());
        let err = engine
            .run(&mut reader, &mut answers, &ProgressReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Apply { .. }));
        assert!(answers.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_boundary_applied_once_per_collection() {
        let (mut engine, _sink, store) = engine();
        let progress = ProgressReporter::new();
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 3)]);

        let (manifest, payload) = json_chunk("Patient", &[1, 2], &totals);
        engine.on_manifest(manifest, &progress).unwrap();
        let entry = engine.on_chunk(payload, &progress).await.unwrap();
        assert_eq!(entry.last_processed_record_id, 2);

        let (manifest, payload) = json_chunk("Patient", &[3], &totals);
        engine.on_manifest(manifest, &progress).unwrap();
        let entry = engine.on_chunk(payload, &progress).await.unwrap();
        assert_eq!(entry.last_processed_record_id, 4);
        assert_eq!(engine.received_for("Patient"), 3);

        let stored = store.get(&peer(), "Patient").await.unwrap().unwrap();
        assert_eq!(stored.last_processed_record_id, 4);
    }

    #[tokio::test]
    async fn test_size_mismatch_is_violation() {
        let (mut engine, sink, _store) = engine();
        let progress = ProgressReporter::new();
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 1)]);

        let (mut manifest, payload) = json_chunk("Patient", &[1], &totals);
        manifest.payload_byte_size += 1;
        engine.on_manifest(manifest, &progress).unwrap();

        let err = engine.on_chunk(payload, &progress).await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
        assert_eq!(sink.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_record_count_mismatch_is_violation() {
        let (mut engine, sink, _store) = engine();
        let progress = ProgressReporter::new();
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 2)]);

        let (mut manifest, payload) = json_chunk("Patient", &[1, 2], &totals);
        manifest.record_count = 3;
        engine.on_manifest(manifest, &progress).unwrap();

        let err = engine.on_chunk(payload, &progress).await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
        assert_eq!(sink.applied_count(), 0);
    }

    #[tokio::test]
    async fn test_chunk_without_manifest_is_violation() {
        let (mut engine, _sink, _store) = engine();
        let err = engine
            .on_chunk(Bytes::from_static(b"[]"), &ProgressReporter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_total_taken_from_first_nonzero_manifest() {
        let (mut engine, _sink, _store) = engine();
        let progress = ProgressReporter::new();
        let totals = RecordCount::from_per_collection([("Patient".to_string(), 4)]);

        let (manifest, payload) = json_chunk("Patient", &[1], &totals);
        engine.on_manifest(manifest, &progress).unwrap();
        engine.on_chunk(payload, &progress).await.unwrap();

        assert_eq!(engine.total_record_count(), 4);
        assert_eq!(progress.current().percentage, 25);
    }

    #[tokio::test]
    async fn test_manifest_after_terminal_is_violation() {
        let (mut engine, _sink, _store) = engine();
        let progress = ProgressReporter::new();
        let done = Manifest::terminal(TerminalOutcome::DataUpToDate, &RecordCount::default());

        assert_eq!(
            engine.on_manifest(done.clone(), &progress).unwrap(),
            ManifestAction::Complete(TerminalOutcome::DataUpToDate)
        );
        assert!(engine.on_manifest(done, &progress).is_err());
    }

    proptest! {
        #[test]
        fn prop_checkpoint_lands_one_past_last(checkpoint in 0i64..1_000, owed in 1i64..80) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let source = Arc::new(MemorySource::new().with_json_records(
                    CollectionDescriptor::json("Patient", 0),
                    (checkpoint + 1)..=(checkpoint + owed),
                ));
                let sink = Arc::new(MemorySink::new());
                let store = Arc::new(MemoryCheckpointStore::with_entries([
                    CheckpointEntry::new(peer(), "Patient", checkpoint),
                ]));

                sync(source, sink.clone(), store.clone()).await.unwrap();

                let entry = store.get(&peer(), "Patient").await.unwrap().unwrap();
                prop_assert_eq!(entry.last_processed_record_id, checkpoint + owed + 1);
                prop_assert_eq!(sink.applied_count() as i64, owed);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
