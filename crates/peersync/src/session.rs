//! The session state machine.
//!
//! A [`Session`] drives one device through discovery, pairing, the identity
//! handshake and the transfer, then tears the link down. The role (sender or
//! receiver) is fixed by which entry point is called.
//!
//! All stream I/O runs on a spawned worker task. The session task only
//! supervises it, reacting to three things:
//!
//! - the worker finishing,
//! - an unsolicited [`PairingEvent::Disconnected`] from the provider,
//! - a cancel request from a [`SessionHandle`].
//!
//! Cancelling aborts the worker, which drops and thereby closes the stream,
//! interrupting any read or write in flight.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use peersync_core::{DeviceRole, SessionState, TerminalOutcome, TransferProgress};
use peersync_transfer::{
    handshake, FramedStream, ProgressReporter, ReceiverDataSink, ReceiverEngine,
    SenderDataSource, SenderEngine, SyncCompletion, TransferError,
};

use crate::context::SyncContext;
use crate::discovery::{ConnectionInfo, Link, PairingEvent, PeerRef, TransportDiscoveryProvider};
use crate::error::{Result, SessionError};

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub role: DeviceRole,
    pub outcome: TerminalOutcome,
    pub records_transferred: i64,
    pub total_records: i64,
    pub peer: PeerRef,
}

/// State shared between a session, its worker and its handles.
struct Shared {
    state: watch::Sender<SessionState>,
    progress: ProgressReporter,
    cancel: watch::Sender<bool>,
    /// Set once we asked the provider to disconnect, so our own teardown is
    /// not mistaken for the peer leaving.
    requested_disconnect: AtomicBool,
    /// Whether an entry point is currently running.
    running: AtomicBool,
    completion: SyncCompletion,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move along a legal edge. Returns false if the edge is not allowed.
    fn advance(&self, next: SessionState) -> bool {
        let mut from = None;
        let moved = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        match from {
            Some(from) => tracing::debug!(%from, to = %next, "session state"),
            None => tracing::warn!(state = %self.state(), to = %next, "transition refused"),
        }
        moved
    }

    fn require(&self, next: SessionState) -> Result<()> {
        if self.advance(next) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.state(),
                to: next,
            })
        }
    }

    fn cancel_requested(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Cloneable handle for observing and cancelling a session from any task.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn progress(&self) -> TransferProgress {
        self.shared.progress.current()
    }

    pub fn watch_progress(&self) -> watch::Receiver<TransferProgress> {
        self.shared.progress.subscribe()
    }

    /// Request cancellation. Always acknowledged: the session settles in
    /// CANCELLED even if tearing the link down fails.
    pub fn cancel(&self) {
        self.shared.cancel.send_replace(true);
        if !self.shared.running.load(Ordering::SeqCst) {
            self.shared.advance(SessionState::Cancelled);
        }
    }
}

/// One device's side of a sync session.
pub struct Session<P: TransportDiscoveryProvider> {
    context: SyncContext,
    provider: Arc<P>,
    events: broadcast::Receiver<PairingEvent>,
    shared: Arc<Shared>,
}

impl<P: TransportDiscoveryProvider + 'static> Session<P> {
    /// Create an idle session. Pairing events are buffered from this point on.
    pub fn new(context: SyncContext, provider: Arc<P>) -> Self {
        let events = provider.subscribe();
        let (state, _) = watch::channel(SessionState::Idle);
        let (cancel, _) = watch::channel(false);
        Self {
            context,
            provider,
            events,
            shared: Arc::new(Shared {
                state,
                progress: ProgressReporter::new(),
                cancel,
                requested_disconnect: AtomicBool::new(false),
                running: AtomicBool::new(false),
                completion: SyncCompletion::new(),
            }),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn progress(&self) -> TransferProgress {
        self.shared.progress.current()
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Start discovery and list visible peers.
    pub async fn search(&mut self) -> Result<Vec<PeerRef>> {
        let _guard = self.context.acquire()?;
        self.prepare_start()?;
        self.shared.require(SessionState::Searching)?;

        match self.provider.search_peers().await {
            Ok(peers) => {
                tracing::debug!(found = peers.len(), "peers discovered");
                Ok(peers)
            }
            Err(e) => {
                self.shared.advance(SessionState::Idle);
                Err(e.into())
            }
        }
    }

    /// Return a settled session to IDLE so a new one can start.
    pub fn reset(&mut self) -> Result<()> {
        let state = self.shared.state();
        if !state.is_settled() {
            return Err(SessionError::InvalidTransition {
                from: state,
                to: SessionState::Idle,
            });
        }
        if state != SessionState::Idle {
            self.shared.require(SessionState::Idle)?;
        }

        self.shared.progress.reset();
        self.shared.completion.reset();
        self.shared.cancel.send_replace(false);
        self.shared.requested_disconnect.store(false, Ordering::SeqCst);
        self.drain_stale_events();
        Ok(())
    }

    /// Drop pairing events left over from the previous link.
    fn drain_stale_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sender
    // ─────────────────────────────────────────────────────────────────────────

    /// Pair with `peer` and push everything it is owed.
    pub async fn send_to(&mut self, peer: &PeerRef) -> Result<SessionReport> {
        let _guard = self.context.acquire()?;
        let source = self.context.source()?;
        self.prepare_start()?;
        self.begin(SessionState::Pairing)?;

        let result = self
            .run_sender(peer, source)
            .await
            .map(|outcome| (outcome, peer.clone()));
        self.finish(DeviceRole::Sender, result).await
    }

    async fn run_sender(
        &mut self,
        peer: &PeerRef,
        source: Arc<dyn SenderDataSource>,
    ) -> Result<TerminalOutcome> {
        let shared = Arc::clone(&self.shared);
        let info = cancellable(&shared, self.pair(peer)).await?;
        shared.require(SessionState::PreparingSend)?;

        let stream = cancellable(&shared, self.open_stream(info.link)).await?;

        let details = self.context.details().clone();
        let config = self.context.config().transfer.clone();
        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            let mut framed = FramedStream::new(stream, &config);
            let (reader, writer) = framed.split_mut();

            let history = handshake::initiate(reader, writer, &details).await?;
            if !worker_shared.advance(SessionState::Sending) {
                return Err(TransferError::Cancelled);
            }

            let mut engine = SenderEngine::prepare(source, &history, config)
                .await?
                .with_completion(worker_shared.completion.clone());
            let outcome = engine.run(reader, writer, &worker_shared.progress).await?;

            if let Err(e) = framed.close().await {
                tracing::debug!(error = %e, "stream close after completion failed");
            }
            Ok(outcome)
        });

        self.supervise(worker).await
    }

    /// Request pairing and wait, bounded by the pairing timeout, for the outcome.
    async fn pair(&mut self, peer: &PeerRef) -> Result<ConnectionInfo> {
        tracing::info!(peer = %peer.name, "pairing");
        self.provider.connect(peer).await?;

        let timeout = self.context.config().pairing_timeout;
        match tokio::time::timeout(timeout, next_pairing(&mut self.events)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Err(e) = self.provider.cancel_connect().await {
                    tracing::warn!(error = %e, "cancelling pairing attempt failed");
                }
                Err(SessionError::PairingTimeout(timeout))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiver
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for a sender to pair with us and apply everything it sends.
    pub async fn receive(&mut self) -> Result<SessionReport> {
        let _guard = self.context.acquire()?;
        let sink = self.context.sink()?;
        self.prepare_start()?;
        self.begin(SessionState::Searching)?;

        let shared = Arc::clone(&self.shared);
        let result = match cancellable(&shared, self.await_sender()).await {
            Ok(info) => self
                .run_receiver(&info, sink)
                .await
                .map(|outcome| (outcome, info.peer)),
            Err(e) => Err(e),
        };
        self.finish(DeviceRole::Receiver, result).await
    }

    async fn await_sender(&mut self) -> Result<ConnectionInfo> {
        self.provider.search_peers().await?;
        tracing::info!("waiting for a sender");
        next_pairing(&mut self.events).await
    }

    async fn run_receiver(
        &mut self,
        info: &ConnectionInfo,
        sink: Arc<dyn ReceiverDataSink>,
    ) -> Result<TerminalOutcome> {
        let shared = Arc::clone(&self.shared);
        shared.require(SessionState::WaitingToReceive)?;

        let stream = cancellable(&shared, self.open_stream(info.link)).await?;

        let store = Arc::clone(self.context.store());
        let config = self.context.config().transfer.clone();
        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            let mut framed = FramedStream::new(stream, &config);
            let (reader, writer) = framed.split_mut();

            let sender = handshake::respond(reader, writer, store.as_ref()).await?;
            if !worker_shared.advance(SessionState::Receiving) {
                return Err(TransferError::Cancelled);
            }

            let mut engine = ReceiverEngine::new(sink, store, sender.app_lifetime_key);
            let outcome = engine.run(reader, writer, &worker_shared.progress).await?;

            if let Err(e) = framed.close().await {
                tracing::debug!(error = %e, "stream close after completion failed");
            }
            Ok(outcome)
        });

        self.supervise(worker).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    fn prepare_start(&mut self) -> Result<()> {
        let state = self.shared.state();
        if state.is_settled() && state != SessionState::Idle {
            self.reset()?;
        }
        Ok(())
    }

    /// Enter the first state of an entry point from IDLE or SEARCHING.
    fn begin(&mut self, first: SessionState) -> Result<()> {
        let state = self.shared.state();
        if state == SessionState::Idle && first != SessionState::Searching {
            self.shared.require(SessionState::Searching)?;
        }
        if self.shared.state() != first {
            self.shared.require(first)?;
        }

        self.shared.progress.reset();
        self.shared.completion.reset();
        self.shared.requested_disconnect.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Open the paired stream, retrying the client link with a fixed backoff.
    async fn open_stream(&self, link: Link) -> Result<P::Stream> {
        let config = self.context.config();
        let attempts = config.connect_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.open_stream(link).await {
                Ok(stream) => {
                    tracing::debug!(?link, attempt, "stream open");
                    return Ok(stream);
                }
                Err(e) if link == Link::Client && attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "connect failed, retrying");
                    tokio::time::sleep(config.connect_backoff).await;
                }
                Err(e) => {
                    return Err(SessionError::ConnectFailed {
                        attempts: attempt,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Wait for the worker while watching for disconnects and cancellation.
    async fn supervise(
        &mut self,
        mut worker: JoinHandle<std::result::Result<TerminalOutcome, TransferError>>,
    ) -> Result<TerminalOutcome> {
        let grace = self.context.config().disconnect_grace;
        let mut cancel = self.shared.cancel.subscribe();

        loop {
            tokio::select! {
                joined = &mut worker => return joined_outcome(joined),
                event = self.events.recv() => match event {
                    Ok(PairingEvent::Disconnected) | Err(RecvError::Closed) => {
                        if self.shared.requested_disconnect.load(Ordering::SeqCst) {
                            continue;
                        }
                        return self.drain_after_disconnect(worker, grace).await;
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "pairing events lagged");
                        continue;
                    }
                },
                _ = wait_cancelled(&mut cancel) => {
                    worker.abort();
                    return Err(SessionError::Cancelled);
                }
            }
        }
    }

    /// The peer dropped the link. Let the in-flight exchange drain briefly.
    async fn drain_after_disconnect(
        &self,
        mut worker: JoinHandle<std::result::Result<TerminalOutcome, TransferError>>,
        grace: Duration,
    ) -> Result<TerminalOutcome> {
        tracing::debug!("peer disconnected, draining");
        let drained = tokio::time::timeout(grace, &mut worker).await;

        match drained {
            Ok(joined) => match joined_outcome(joined) {
                Ok(outcome) => Ok(outcome),
                // Terminal manifest acknowledged; the peer leaving is the normal end.
                Err(_) if self.shared.completion.is_complete() => self
                    .shared
                    .completion
                    .outcome()
                    .ok_or(SessionError::Disconnected),
                Err(SessionError::Transfer(TransferError::Transport(_))) => {
                    Err(SessionError::Disconnected)
                }
                Err(e) => Err(e),
            },
            Err(_) => {
                worker.abort();
                match self.shared.completion.outcome() {
                    Some(outcome) => Ok(outcome),
                    None => Err(SessionError::Disconnected),
                }
            }
        }
    }

    /// Settle into a final state, releasing the link and the store.
    async fn finish(
        &mut self,
        role: DeviceRole,
        result: Result<(TerminalOutcome, PeerRef)>,
    ) -> Result<SessionReport> {
        // A failure caused by tearing the stream down on cancel reports as the cancel.
        let result = match result {
            Err(_) if self.shared.cancel_requested() => Err(SessionError::Cancelled),
            other => other,
        };

        let outcome = match result {
            Ok((outcome, peer)) => {
                self.shared.advance(outcome.state());
                self.teardown().await;
                self.shared.advance(SessionState::Disconnected);

                let progress = self.shared.progress.current();
                tracing::info!(
                    %role,
                    outcome = ?outcome,
                    records = progress.transferred_records,
                    "session complete"
                );
                Ok(SessionReport {
                    role,
                    outcome,
                    records_transferred: progress.transferred_records,
                    total_records: progress.total_records,
                    peer,
                })
            }
            Err(SessionError::Cancelled) => {
                if self.shared.state() == SessionState::Pairing {
                    if let Err(e) = self.provider.cancel_connect().await {
                        tracing::warn!(error = %e, "cancelling pairing attempt failed");
                    }
                }
                self.teardown().await;
                self.shared.advance(SessionState::Cancelled);
                tracing::info!(%role, "session cancelled");
                Err(SessionError::Cancelled)
            }
            Err(e @ (SessionError::PairingTimeout(_) | SessionError::PairingFailed(_))) => {
                if self.shared.state() == SessionState::Pairing {
                    self.shared.advance(SessionState::PairingFailed);
                }
                self.release_store().await;
                self.shared.advance(SessionState::Idle);
                tracing::warn!(%role, error = %e, "pairing failed");
                Err(e)
            }
            Err(e) => {
                self.teardown().await;
                self.settle_failed();
                tracing::error!(%role, error = %e, "session failed");
                Err(e)
            }
        };

        self.shared.running.store(false, Ordering::SeqCst);
        outcome
    }

    fn settle_failed(&self) {
        let state = self.shared.state();
        if state.can_transition_to(SessionState::Disconnected) {
            self.shared.advance(SessionState::Disconnected);
        } else if state == SessionState::Pairing {
            self.shared.advance(SessionState::PairingFailed);
            self.shared.advance(SessionState::Idle);
        } else if state.can_transition_to(SessionState::Idle) {
            self.shared.advance(SessionState::Idle);
        }
    }

    /// Disconnect and release the store. Errors are logged, never surfaced.
    async fn teardown(&self) {
        self.shared.requested_disconnect.store(true, Ordering::SeqCst);
        if let Err(e) = self.provider.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
        }
        self.release_store().await;
    }

    async fn release_store(&self) {
        if let Err(e) = self.context.store().release().await {
            tracing::warn!(error = %e, "checkpoint store release failed");
        }
    }
}

/// Run `fut` unless cancellation is requested first.
async fn cancellable<T>(shared: &Shared, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let mut cancel = shared.cancel.subscribe();
    tokio::select! {
        result = fut => result,
        _ = wait_cancelled(&mut cancel) => Err(SessionError::Cancelled),
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    let requested = cancel.wait_for(|cancelled| *cancelled).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Next pairing outcome. Stale disconnects from an earlier link are skipped.
async fn next_pairing(events: &mut broadcast::Receiver<PairingEvent>) -> Result<ConnectionInfo> {
    loop {
        match events.recv().await {
            Ok(PairingEvent::Paired(info)) => return Ok(info),
            Ok(PairingEvent::PairingFailed(reason)) => {
                return Err(SessionError::PairingFailed(reason))
            }
            Ok(PairingEvent::Disconnected) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "pairing events lagged");
            }
            Err(RecvError::Closed) => return Err(SessionError::Disconnected),
        }
    }
}

fn joined_outcome(
    joined: std::result::Result<std::result::Result<TerminalOutcome, TransferError>, JoinError>,
) -> Result<TerminalOutcome> {
    match joined {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(TransferError::Cancelled)) => Err(SessionError::Cancelled),
        Ok(Err(e)) => Err(e.into()),
        Err(e) if e.is_cancelled() => Err(SessionError::Cancelled),
        Err(e) => Err(SessionError::Worker(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::discovery::memory::{MemoryDiscovery, PairingBehavior};
    use peersync_core::{AppLifetimeKey, CollectionDescriptor, DeviceDetails};
    use peersync_store::MemoryCheckpointStore;
    use peersync_transfer::source::memory::{MemorySink, MemorySource};

    fn config() -> SessionConfig {
        SessionConfig {
            pairing_timeout: Duration::from_millis(100),
            connect_backoff: Duration::from_millis(5),
            disconnect_grace: Duration::from_millis(200),
            ..SessionConfig::default()
        }
    }

    fn sender_session(provider: MemoryDiscovery) -> Session<MemoryDiscovery> {
        let source = MemorySource::new()
            .with_json_records(CollectionDescriptor::json("Patient", 0), [1, 2, 3]);
        let context = SyncContext::builder(
            DeviceDetails::new(AppLifetimeKey::generate(), "sender"),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .source(Arc::new(source))
        .config(config())
        .build()
        .unwrap();
        Session::new(context, Arc::new(provider))
    }

    fn receiver_session(provider: MemoryDiscovery) -> Session<MemoryDiscovery> {
        let context = SyncContext::builder(
            DeviceDetails::new(AppLifetimeKey::generate(), "receiver"),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .sink(Arc::new(MemorySink::new()))
        .config(config())
        .build()
        .unwrap();
        Session::new(context, Arc::new(provider))
    }

    fn providers() -> (MemoryDiscovery, MemoryDiscovery) {
        MemoryDiscovery::pair(PeerRef::new("s", "Sender"), PeerRef::new("r", "Receiver"))
    }

    #[tokio::test]
    async fn test_search_lists_peer() {
        let (a, b) = providers();
        let mut session = sender_session(a);
        let peers = session.search().await.unwrap();
        assert_eq!(peers, vec![b.local_peer()]);
        assert_eq!(session.state(), SessionState::Searching);
    }

    #[tokio::test]
    async fn test_sender_without_source_is_rejected() {
        let (_a, b) = providers();
        let mut session = receiver_session(b.clone());
        let err = session.send_to(&b.remote_peer()).await.unwrap_err();
        assert!(matches!(err, SessionError::RoleUnavailable(DeviceRole::Sender)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_pairing_timeout_returns_to_idle() {
        let (a, b) = providers();
        a.set_pairing_behavior(PairingBehavior::Never);
        let peer = a.remote_peer();
        let mut session = sender_session(a);
        let mut states = session.handle().watch_state();

        let err = session.send_to(&peer).await.unwrap_err();
        assert!(matches!(err, SessionError::PairingTimeout(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(states.has_changed().unwrap());
        assert!(!b.is_connected());
    }

    #[tokio::test]
    async fn test_pairing_failure_reported() {
        let (a, _b) = providers();
        a.set_pairing_behavior(PairingBehavior::Fail);
        let peer = a.remote_peer();
        let mut session = sender_session(a);

        let err = session.send_to(&peer).await.unwrap_err();
        assert!(matches!(err, SessionError::PairingFailed(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let (a, _b) = providers();
        let mut session = sender_session(a);
        session.handle().cancel();
        assert_eq!(session.state(), SessionState::Cancelled);

        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_reset_refused_mid_session() {
        let (a, _b) = providers();
        let mut session = sender_session(a);
        session.search().await.unwrap();
        assert!(matches!(
            session.reset(),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (a, b) = providers();
        let peer = a.remote_peer();
        let mut sender = sender_session(a);
        let mut receiver = receiver_session(b);

        let receiving = tokio::spawn(async move { receiver.receive().await });
        let sent = sender.send_to(&peer).await.unwrap();
        let received = receiving.await.unwrap().unwrap();

        assert_eq!(sent.outcome, TerminalOutcome::TransferComplete);
        assert_eq!(sent.records_transferred, 3);
        assert_eq!(received.outcome, TerminalOutcome::TransferComplete);
        assert_eq!(received.records_transferred, 3);
        assert_eq!(sender.state(), SessionState::Disconnected);
    }

    fn broken_link_worker() -> JoinHandle<std::result::Result<TerminalOutcome, TransferError>> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(TransferError::Transport(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )))
        })
    }

    #[tokio::test]
    async fn test_disconnect_after_acknowledged_terminal_is_ok() {
        let (a, _b) = providers();
        let mut session = sender_session(a.clone());
        a.connect(&a.remote_peer()).await.unwrap();
        a.disconnect().await.unwrap();
        session.shared.completion.mark(TerminalOutcome::TransferComplete);

        let outcome = session.supervise(broken_link_worker()).await.unwrap();
        assert_eq!(outcome, TerminalOutcome::TransferComplete);
    }

    #[tokio::test]
    async fn test_unsolicited_disconnect_mid_transfer_fails() {
        let (a, _b) = providers();
        let mut session = sender_session(a.clone());
        a.connect(&a.remote_peer()).await.unwrap();
        a.disconnect().await.unwrap();

        let err = session.supervise(broken_link_worker()).await.unwrap_err();
        assert!(matches!(err, SessionError::Disconnected));
    }
}
