//! Test fixtures and helpers.
//!
//! Common setup code for end-to-end tests: two devices paired over the
//! in-memory discovery provider, one sending and one receiving.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use peersync::discovery::memory::MemoryDiscovery;
use peersync::{PeerRef, Session, SessionConfig, SessionReport, SyncContext};
use peersync_core::{
    AppLifetimeKey, CheckpointEntry, CheckpointSeed, CollectionDescriptor, CollectionSet,
    DeviceDetails, RecordCount, RecordId,
};
use peersync_store::{CheckpointStore, MemoryCheckpointStore};
use peersync_transfer::source::memory::{MemorySink, MemorySource};
use peersync_transfer::{ReceiverDataSink, RecordBatch, RecordPage, SenderDataSource};

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Timeouts short enough for tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        pairing_timeout: Duration::from_millis(200),
        connect_backoff: Duration::from_millis(10),
        disconnect_grace: Duration::from_millis(500),
        ..SessionConfig::default()
    }
}

/// `Group` (order 0, empty) and `Patient` (order 1, ids 10, 11, 12).
pub fn group_patient_source() -> MemorySource {
    MemorySource::new()
        .with_collection(CollectionDescriptor::json("Group", 0))
        .with_json_records(CollectionDescriptor::json("Patient", 1), [10, 11, 12])
}

/// A source that waits before serving each page.
pub struct SlowSource {
    inner: MemorySource,
    delay: Duration,
}

impl SlowSource {
    pub fn new(inner: MemorySource, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl SenderDataSource for SlowSource {
    async fn collections(&self) -> anyhow::Result<CollectionSet> {
        self.inner.collections().await
    }

    async fn total_record_count(&self, seed: &CheckpointSeed) -> anyhow::Result<RecordCount> {
        self.inner.total_record_count(seed).await
    }

    async fn page(
        &self,
        collection: &CollectionDescriptor,
        after_id: RecordId,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<RecordPage> {
        tokio::time::sleep(self.delay).await;
        self.inner.page(collection, after_id, limit, offset).await
    }
}

/// A sink that waits before applying each batch.
pub struct SlowSink {
    inner: Arc<MemorySink>,
    delay: Duration,
}

impl SlowSink {
    pub fn new(inner: Arc<MemorySink>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl ReceiverDataSink for SlowSink {
    async fn apply(&self, collection: &str, records: RecordBatch) -> anyhow::Result<RecordId> {
        tokio::time::sleep(self.delay).await;
        self.inner.apply(collection, records).await
    }
}

/// A sending and a receiving device paired with each other.
pub struct SyncPair {
    pub sender: Session<MemoryDiscovery>,
    pub receiver: Session<MemoryDiscovery>,
    pub sender_discovery: MemoryDiscovery,
    pub receiver_discovery: MemoryDiscovery,
    pub sender_key: AppLifetimeKey,
    pub sink: Arc<MemorySink>,
    pub store: Arc<dyn CheckpointStore>,
}

impl SyncPair {
    /// Pair with an in-memory checkpoint store and [`fast_config`].
    pub fn new(source: impl SenderDataSource + 'static) -> Self {
        Self::with_store(
            Arc::new(source),
            Arc::new(MemoryCheckpointStore::new()),
            fast_config(),
        )
    }

    pub fn with_store(
        source: Arc<dyn SenderDataSource>,
        store: Arc<dyn CheckpointStore>,
        config: SessionConfig,
    ) -> Self {
        Self::assemble(source, store, config, None)
    }

    /// Pair whose receiver sink waits `delay` before every batch.
    pub fn with_slow_sink(
        source: impl SenderDataSource + 'static,
        delay: Duration,
        config: SessionConfig,
    ) -> Self {
        Self::assemble(
            Arc::new(source),
            Arc::new(MemoryCheckpointStore::new()),
            config,
            Some(delay),
        )
    }

    fn assemble(
        source: Arc<dyn SenderDataSource>,
        store: Arc<dyn CheckpointStore>,
        config: SessionConfig,
        sink_delay: Option<Duration>,
    ) -> Self {
        let (sender_discovery, receiver_discovery) = MemoryDiscovery::pair(
            PeerRef::new("sender-radio", "Sender"),
            PeerRef::new("receiver-radio", "Receiver"),
        );

        let sender_key = AppLifetimeKey::generate();
        let sender_context = SyncContext::builder(
            DeviceDetails::new(sender_key.clone(), "sender-device"),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .source(source)
        .config(config.clone())
        .build()
        .expect("sender context");

        let sink = Arc::new(MemorySink::new());
        let receiver_sink: Arc<dyn ReceiverDataSink> = match sink_delay {
            Some(delay) => Arc::new(SlowSink::new(Arc::clone(&sink), delay)),
            None => sink.clone(),
        };
        let receiver_context = SyncContext::builder(
            DeviceDetails::new(AppLifetimeKey::generate(), "receiver-device"),
            Arc::clone(&store),
        )
        .sink(receiver_sink)
        .config(config)
        .build()
        .expect("receiver context");

        Self {
            sender: Session::new(sender_context, Arc::new(sender_discovery.clone())),
            receiver: Session::new(receiver_context, Arc::new(receiver_discovery.clone())),
            sender_discovery,
            receiver_discovery,
            sender_key,
            sink,
            store,
        }
    }

    /// Record that the receiver already holds `collection` up to `last_id`.
    pub async fn seed_checkpoint(&self, collection: &str, last_id: RecordId) {
        self.store
            .upsert(&CheckpointEntry::new(self.sender_key.clone(), collection, last_id))
            .await
            .expect("seed checkpoint");
    }

    /// The receiver's checkpoint for `collection`.
    pub async fn checkpoint(&self, collection: &str) -> Option<RecordId> {
        self.store
            .get(&self.sender_key, collection)
            .await
            .expect("read checkpoint")
            .map(|entry| entry.last_processed_record_id)
    }

    /// Run one session on both devices. Returns `(sender, receiver)` results.
    pub async fn run(
        &mut self,
    ) -> (
        peersync::Result<SessionReport>,
        peersync::Result<SessionReport>,
    ) {
        let peer = self.sender_discovery.remote_peer();
        let Self {
            sender, receiver, ..
        } = self;
        let (received, sent) = tokio::join!(receiver.receive(), sender.send_to(&peer));
        (sent, received)
    }

    /// Return both sessions to IDLE.
    pub fn reset(&mut self) {
        self.sender.reset().expect("reset sender");
        self.receiver.reset().expect("reset receiver");
    }
}
