//! Process-wide sync context.
//!
//! A [`SyncContext`] is built once and handed to every [`Session`](crate::Session).
//! It carries this device's identity, the host's checkpoint store and data
//! adapters, and the guard that keeps at most one session active at a time.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use peersync_core::{DeviceDetails, DeviceRole};
use peersync_store::CheckpointStore;
use peersync_transfer::{ReceiverDataSink, SenderDataSource};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Shared, cheaply cloned handle to the host's collaborators.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    details: DeviceDetails,
    store: Arc<dyn CheckpointStore>,
    source: Option<Arc<dyn SenderDataSource>>,
    sink: Option<Arc<dyn ReceiverDataSink>>,
    config: SessionConfig,
    active: Arc<Mutex<()>>,
}

/// Held for the lifetime of an active session.
pub(crate) type ActiveGuard = OwnedMutexGuard<()>;

impl SyncContext {
    pub fn builder(details: DeviceDetails, store: Arc<dyn CheckpointStore>) -> SyncContextBuilder {
        SyncContextBuilder {
            details,
            store,
            source: None,
            sink: None,
            config: SessionConfig::default(),
        }
    }

    pub fn details(&self) -> &DeviceDetails {
        &self.inner.details
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Whether this context can play `role`.
    pub fn supports(&self, role: DeviceRole) -> bool {
        match role {
            DeviceRole::Sender => self.inner.source.is_some(),
            DeviceRole::Receiver => self.inner.sink.is_some(),
        }
    }

    pub(crate) fn source(&self) -> Result<Arc<dyn SenderDataSource>> {
        self.inner
            .source
            .clone()
            .ok_or(SessionError::RoleUnavailable(DeviceRole::Sender))
    }

    pub(crate) fn sink(&self) -> Result<Arc<dyn ReceiverDataSink>> {
        self.inner
            .sink
            .clone()
            .ok_or(SessionError::RoleUnavailable(DeviceRole::Receiver))
    }

    /// Claim the single active-session slot.
    pub(crate) fn acquire(&self) -> Result<ActiveGuard> {
        Arc::clone(&self.inner.active)
            .try_lock_owned()
            .map_err(|_| SessionError::Busy)
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("details", &self.inner.details)
            .field("sender", &self.inner.source.is_some())
            .field("receiver", &self.inner.sink.is_some())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`SyncContext`].
pub struct SyncContextBuilder {
    details: DeviceDetails,
    store: Arc<dyn CheckpointStore>,
    source: Option<Arc<dyn SenderDataSource>>,
    sink: Option<Arc<dyn ReceiverDataSink>>,
    config: SessionConfig,
}

impl SyncContextBuilder {
    /// Records this device offers when sending.
    pub fn source(mut self, source: Arc<dyn SenderDataSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Where records land when receiving.
    pub fn sink(mut self, sink: Arc<dyn ReceiverDataSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<SyncContext> {
        self.details.validate()?;
        Ok(SyncContext {
            inner: Arc::new(ContextInner {
                details: self.details,
                store: self.store,
                source: self.source,
                sink: self.sink,
                config: self.config,
                active: Arc::new(Mutex::new(())),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_core::AppLifetimeKey;
    use peersync_store::MemoryCheckpointStore;
    use peersync_transfer::source::memory::MemorySink;

    fn details() -> DeviceDetails {
        DeviceDetails::new(AppLifetimeKey::generate(), "tablet-1")
    }

    #[test]
    fn test_single_active_session() {
        let context = SyncContext::builder(details(), Arc::new(MemoryCheckpointStore::new()))
            .build()
            .unwrap();

        let guard = context.acquire().unwrap();
        assert!(matches!(context.clone().acquire(), Err(SessionError::Busy)));
        drop(guard);
        assert!(context.acquire().is_ok());
    }

    #[test]
    fn test_roles_follow_adapters() {
        let context = SyncContext::builder(details(), Arc::new(MemoryCheckpointStore::new()))
            .sink(Arc::new(MemorySink::new()))
            .build()
            .unwrap();

        assert!(context.supports(DeviceRole::Receiver));
        assert!(!context.supports(DeviceRole::Sender));
        assert!(matches!(
            context.source(),
            Err(SessionError::RoleUnavailable(DeviceRole::Sender))
        ));
    }

    #[test]
    fn test_blank_identity_rejected() {
        let details: DeviceDetails =
            serde_json::from_str(r#"{"app-lifetime-key":"  ","device-id":"tablet-1"}"#).unwrap();
        let result = SyncContext::builder(details, Arc::new(MemoryCheckpointStore::new())).build();
        assert!(matches!(result, Err(SessionError::Core(_))));
    }
}
