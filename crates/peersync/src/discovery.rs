//! Discovery provider abstraction.
//!
//! A provider finds peers, negotiates pairing, and hands the session one
//! connected duplex stream. Pairing outcomes arrive asynchronously as
//! [`PairingEvent`]s on a broadcast channel, each delivered once.
//!
//! Any concrete mechanism (Bluetooth, local network, USB) can sit behind
//! [`TransportDiscoveryProvider`]; the session only sees streams and events.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

/// A discovered peer, as the provider identifies it.
///
/// This is a transient handle. Checkpoints are keyed by the identity
/// exchanged in the handshake, never by a `PeerRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub id: String,
    pub name: String,
}

impl PeerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Which end of the stream this device opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Accept the peer's connection.
    Server,
    /// Connect to the peer. Retried with backoff.
    Client,
}

/// Details of a successful pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer: PeerRef,
    pub link: Link,
}

/// Asynchronous outcome reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    Paired(ConnectionInfo),
    PairingFailed(String),
    Disconnected,
}

/// Errors reported by a discovery provider.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The requested peer is not reachable.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Opening the stream failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// No paired link to operate on.
    #[error("not connected")]
    NotConnected,

    /// Provider-specific failure.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Source of peers, pairing events and connected streams.
#[async_trait]
pub trait TransportDiscoveryProvider: Send + Sync {
    /// The connected byte stream handed to the session.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Start discovery and return the peers currently visible.
    async fn search_peers(&self) -> Result<Vec<PeerRef>, DiscoveryError>;

    /// Initiate pairing with `peer`. The outcome arrives as a [`PairingEvent`].
    async fn connect(&self, peer: &PeerRef) -> Result<(), DiscoveryError>;

    /// Make one attempt at opening the paired stream.
    async fn open_stream(&self, link: Link) -> Result<Self::Stream, DiscoveryError>;

    /// Tear down the paired link.
    async fn disconnect(&self) -> Result<(), DiscoveryError>;

    /// Abandon an in-flight pairing attempt.
    async fn cancel_connect(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    /// The peer currently paired, if any.
    fn current_peer(&self) -> Option<PeerRef>;

    /// Subscribe to pairing events. Events sent before subscribing are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<PairingEvent>;
}

/// In-process discovery for tests and demos.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use tokio::io::DuplexStream;

    const PIPE_CAPACITY: usize = 64 * 1024;

    /// How the remote side answers a pairing request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PairingBehavior {
        Succeed,
        Fail,
        /// Never answer; the initiator's pairing timeout fires.
        Never,
    }

    struct Side {
        peer: PeerRef,
        events: broadcast::Sender<PairingEvent>,
    }

    struct Hub {
        sides: [Side; 2],
        behavior: Mutex<PairingBehavior>,
        client_failures: AtomicU32,
        fail_disconnect: AtomicBool,
        connected: AtomicBool,
        streams: Mutex<[Option<DuplexStream>; 2]>,
        connect_calls: AtomicU32,
    }

    impl Hub {
        fn lock_streams(&self) -> std::sync::MutexGuard<'_, [Option<DuplexStream>; 2]> {
            self.streams.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// One end of a pair of in-process peers.
    #[derive(Clone)]
    pub struct MemoryDiscovery {
        index: usize,
        hub: Arc<Hub>,
    }

    impl MemoryDiscovery {
        /// Two providers that can only see each other.
        pub fn pair(a: PeerRef, b: PeerRef) -> (Self, Self) {
            let (events_a, _) = broadcast::channel(16);
            let (events_b, _) = broadcast::channel(16);
            let hub = Arc::new(Hub {
                sides: [
                    Side {
                        peer: a,
                        events: events_a,
                    },
                    Side {
                        peer: b,
                        events: events_b,
                    },
                ],
                behavior: Mutex::new(PairingBehavior::Succeed),
                client_failures: AtomicU32::new(0),
                fail_disconnect: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                streams: Mutex::new([None, None]),
                connect_calls: AtomicU32::new(0),
            });
            (
                Self {
                    index: 0,
                    hub: Arc::clone(&hub),
                },
                Self { index: 1, hub },
            )
        }

        /// This side's own identity as the other side sees it.
        pub fn local_peer(&self) -> PeerRef {
            self.hub.sides[self.index].peer.clone()
        }

        /// The only peer this side can discover.
        pub fn remote_peer(&self) -> PeerRef {
            self.hub.sides[1 - self.index].peer.clone()
        }

        /// How pairing requests are answered from now on.
        pub fn set_pairing_behavior(&self, behavior: PairingBehavior) {
            *self
                .hub
                .behavior
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = behavior;
        }

        /// Fail the next `count` client stream opens.
        pub fn fail_client_connects(&self, count: u32) {
            self.hub.client_failures.store(count, Ordering::SeqCst);
        }

        /// Make `disconnect` report an error after tearing the link down.
        pub fn fail_disconnect(&self, fail: bool) {
            self.hub.fail_disconnect.store(fail, Ordering::SeqCst);
        }

        /// Stream opens attempted so far, successful or not.
        pub fn connect_attempts(&self) -> u32 {
            self.hub.connect_calls.load(Ordering::SeqCst)
        }

        pub fn is_connected(&self) -> bool {
            self.hub.connected.load(Ordering::SeqCst)
        }

        fn behavior(&self) -> PairingBehavior {
            *self
                .hub
                .behavior
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        }

        fn emit(&self, index: usize, event: PairingEvent) {
            // No subscribers is fine; the event is simply dropped.
            let _ = self.hub.sides[index].events.send(event);
        }
    }

    #[async_trait]
    impl TransportDiscoveryProvider for MemoryDiscovery {
        type Stream = DuplexStream;

        async fn search_peers(&self) -> Result<Vec<PeerRef>, DiscoveryError> {
            Ok(vec![self.remote_peer()])
        }

        async fn connect(&self, peer: &PeerRef) -> Result<(), DiscoveryError> {
            if *peer != self.remote_peer() {
                return Err(DiscoveryError::PeerNotFound(peer.id.clone()));
            }

            match self.behavior() {
                PairingBehavior::Succeed => {
                    let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
                    {
                        let mut streams = self.hub.lock_streams();
                        streams[self.index] = Some(ours);
                        streams[1 - self.index] = Some(theirs);
                    }
                    self.hub.connected.store(true, Ordering::SeqCst);

                    // The responder hosts the link; the initiator connects to it.
                    self.emit(
                        self.index,
                        PairingEvent::Paired(ConnectionInfo {
                            peer: self.remote_peer(),
                            link: Link::Client,
                        }),
                    );
                    self.emit(
                        1 - self.index,
                        PairingEvent::Paired(ConnectionInfo {
                            peer: self.local_peer(),
                            link: Link::Server,
                        }),
                    );
                }
                PairingBehavior::Fail => {
                    self.emit(
                        self.index,
                        PairingEvent::PairingFailed("peer declined pairing".into()),
                    );
                }
                PairingBehavior::Never => {}
            }
            Ok(())
        }

        async fn open_stream(&self, link: Link) -> Result<Self::Stream, DiscoveryError> {
            self.hub.connect_calls.fetch_add(1, Ordering::SeqCst);

            if link == Link::Client {
                let failed = self
                    .hub
                    .client_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failed {
                    return Err(DiscoveryError::ConnectFailed("connection refused".into()));
                }
            }

            self.hub.lock_streams()[self.index]
                .take()
                .ok_or(DiscoveryError::NotConnected)
        }

        async fn disconnect(&self) -> Result<(), DiscoveryError> {
            let was_connected = self.hub.connected.swap(false, Ordering::SeqCst);
            *self.hub.lock_streams() = [None, None];

            if was_connected {
                self.emit(0, PairingEvent::Disconnected);
                self.emit(1, PairingEvent::Disconnected);
            }

            if self.hub.fail_disconnect.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Other(anyhow::anyhow!("radio busy")));
            }
            Ok(())
        }

        fn current_peer(&self) -> Option<PeerRef> {
            self.is_connected().then(|| self.remote_peer())
        }

        fn subscribe(&self) -> broadcast::Receiver<PairingEvent> {
            self.hub.sides[self.index].events.subscribe()
        }
    }

}
