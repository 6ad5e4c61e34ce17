//! Progress reporting for observers.
//!
//! Engines push counts into a [`ProgressReporter`]; observers hold a
//! `watch::Receiver` and see the latest [`TransferProgress`] from whatever
//! task they run on.

use std::sync::Arc;

use tokio::sync::watch;

use peersync_core::TransferProgress;

/// Publishes monotonic progress snapshots.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<TransferProgress>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TransferProgress::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferProgress> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TransferProgress {
        *self.tx.borrow()
    }

    /// Announce the session total. Only the first non-zero total is kept.
    pub fn start(&self, total_records: i64) {
        self.tx.send_if_modified(|progress| {
            if progress.total_records != 0 || total_records <= 0 {
                return false;
            }
            *progress = TransferProgress::new(total_records, progress.transferred_records);
            true
        });
        tracing::debug!(total_records, "transfer starting");
    }

    /// Count `records` more as transferred.
    pub fn advance(&self, records: i64) {
        if records <= 0 {
            return;
        }
        self.tx.send_modify(|progress| {
            let transferred = progress.transferred_records.saturating_add(records);
            *progress = TransferProgress::new(progress.total_records, transferred);
        });
    }

    /// Back to zero for a new session.
    pub fn reset(&self) {
        self.tx.send_replace(TransferProgress::default());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
