//! SQLite implementation of the CheckpointStore trait.
//!
//! Primary storage backend. Uses rusqlite with bundled SQLite, wrapped in
//! async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use peersync_core::{AppLifetimeKey, CheckpointEntry};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CheckpointStore, UpsertResult};

/// SQLite-based checkpoint store.
///
/// Thread-safe via internal Mutex. All operations run on the blocking pool.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Open a SQLite database at the given path, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_entry((peer, collection, last): (String, String, i64)) -> Result<CheckpointEntry> {
    let key = AppLifetimeKey::new(peer)
        .map_err(|e| StoreError::InvalidData(format!("stored peer key: {}", e)))?;
    Ok(CheckpointEntry::new(key, collection, last))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_history(&self, peer: &AppLifetimeKey) -> Result<Vec<CheckpointEntry>> {
        let peer = peer.as_str().to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sending_peer_key, collection_name, last_processed_record_id
                 FROM checkpoints WHERE sending_peer_key = ?1
                 ORDER BY collection_name",
            )?;

            let rows = stmt
                .query_map(params![peer], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter().map(into_entry).collect()
        })
        .await
    }

    async fn get(
        &self,
        peer: &AppLifetimeKey,
        collection_name: &str,
    ) -> Result<Option<CheckpointEntry>> {
        let peer = peer.as_str().to_string();
        let collection = collection_name.to_string();

        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT sending_peer_key, collection_name, last_processed_record_id
                     FROM checkpoints WHERE sending_peer_key = ?1 AND collection_name = ?2",
                    params![peer, collection],
                    row_to_entry,
                )
                .optional()?;

            row.map(into_entry).transpose()
        })
        .await
    }

    async fn upsert(&self, entry: &CheckpointEntry) -> Result<UpsertResult> {
        let peer = entry.sending_peer_key.as_str().to_string();
        let collection = entry.collection_name.clone();
        let last = entry.last_processed_record_id;

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM checkpoints WHERE sending_peer_key = ?1 AND collection_name = ?2",
                    params![peer, collection],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            let now = now_millis();
            let result = if exists {
                tx.execute(
                    "UPDATE checkpoints SET last_processed_record_id = ?3, updated_at = ?4
                     WHERE sending_peer_key = ?1 AND collection_name = ?2",
                    params![peer, collection, last, now],
                )?;
                UpsertResult::Updated
            } else {
                tx.execute(
                    "INSERT INTO checkpoints
                     (sending_peer_key, collection_name, last_processed_record_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![peer, collection, last, now],
                )?;
                UpsertResult::Inserted
            };

            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn clear(&self, peer: &AppLifetimeKey) -> Result<usize> {
        let peer = peer.as_str().to_string();

        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM checkpoints WHERE sending_peer_key = ?1",
                params![peer],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn release(&self) -> Result<()> {
        self.run(|conn| {
            conn.execute_batch("PRAGMA optimize;")?;
            Ok(())
        })
        .await
    }
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
