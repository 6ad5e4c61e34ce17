//! In-memory implementation of the CheckpointStore trait.
//!
//! Same semantics as SQLite, no persistence. Used by tests and by hosts that
//! only ever sync once per process.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use peersync_core::{AppLifetimeKey, CheckpointEntry, RecordId};

use crate::error::{Result, StoreError};
use crate::traits::{CheckpointStore, UpsertResult};

/// In-memory checkpoint store. Thread-safe via RwLock.
pub struct MemoryCheckpointStore {
    /// (peer, collection) -> last processed record id.
    entries: RwLock<BTreeMap<(AppLifetimeKey, String), RecordId>>,
}

impl MemoryCheckpointStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store pre-populated with entries.
    pub fn with_entries(entries: impl IntoIterator<Item = CheckpointEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|e| ((e.sending_peer_key, e.collection_name), e.last_processed_record_id))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Number of entries across all peers.
    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<(AppLifetimeKey, String), RecordId>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<(AppLifetimeKey, String), RecordId>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_history(&self, peer: &AppLifetimeKey) -> Result<Vec<CheckpointEntry>> {
        let entries = self.read()?;
        Ok(entries
            .iter()
            .filter(|((key, _), _)| key == peer)
            .map(|((key, collection), last)| {
                CheckpointEntry::new(key.clone(), collection.clone(), *last)
            })
            .collect())
    }

    async fn get(
        &self,
        peer: &AppLifetimeKey,
        collection_name: &str,
    ) -> Result<Option<CheckpointEntry>> {
        let entries = self.read()?;
        Ok(entries
            .get(&(peer.clone(), collection_name.to_string()))
            .map(|last| CheckpointEntry::new(peer.clone(), collection_name, *last)))
    }

    async fn upsert(&self, entry: &CheckpointEntry) -> Result<UpsertResult> {
        let mut entries = self.write()?;
        let key = (entry.sending_peer_key.clone(), entry.collection_name.clone());
        match entries.insert(key, entry.last_processed_record_id) {
            Some(_) => Ok(UpsertResult::Updated),
            None => Ok(UpsertResult::Inserted),
        }
    }

    async fn clear(&self, peer: &AppLifetimeKey) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|(key, _), _| key != peer);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> AppLifetimeKey {
        AppLifetimeKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = MemoryCheckpointStore::new();
        let entry = CheckpointEntry::new(peer("a"), "Patient", 10);

        assert_eq!(store.upsert(&entry).await.unwrap(), UpsertResult::Inserted);

        let moved = CheckpointEntry::new(peer("a"), "Patient", 13);
        assert_eq!(store.upsert(&moved).await.unwrap(), UpsertResult::Updated);

        let got = store.get(&peer("a"), "Patient").await.unwrap().unwrap();
        assert_eq!(got.last_processed_record_id, 13);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_peer() {
        let store = MemoryCheckpointStore::with_entries([
            CheckpointEntry::new(peer("a"), "Patient", 5),
            CheckpointEntry::new(peer("a"), "Group", 2),
            CheckpointEntry::new(peer("b"), "Patient", 99),
        ]);

        let history = store.get_history(&peer("a")).await.unwrap();
        let names: Vec<_> = history.iter().map(|e| e.collection_name.as_str()).collect();
        assert_eq!(names, vec!["Group", "Patient"]);
        assert!(history.iter().all(|e| e.sending_peer_key == peer("a")));
    }

    #[tokio::test]
    async fn test_clear_removes_only_that_peer() {
        let store = MemoryCheckpointStore::with_entries([
            CheckpointEntry::new(peer("a"), "Patient", 5),
            CheckpointEntry::new(peer("b"), "Patient", 7),
        ]);

        assert_eq!(store.clear(&peer("a")).await.unwrap(), 1);
        assert!(store.get_history(&peer("a")).await.unwrap().is_empty());
        assert_eq!(store.get_history(&peer("b")).await.unwrap().len(), 1);
        assert_eq!(store.clear(&peer("a")).await.unwrap(), 0);
    }
}
