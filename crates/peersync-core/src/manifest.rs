//! Manifest control messages.
//!
//! One manifest precedes every chunk payload. Terminal manifests stand alone
//! and are recognised by their reserved collection name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collection::{CollectionDescriptor, ContentKind};
use crate::error::{CoreError, Result};
use crate::record::RecordCount;
use crate::state::TerminalOutcome;

/// Collection name of the manifest sent after the last batch.
pub const SYNC_COMPLETE: &str = "SYNC_COMPLETE";

/// Collection name of the manifest sent when nothing was owed.
pub const DATA_UP_TO_DATE: &str = "DATA_UP_TO_DATE";

/// Describes the chunk that follows, or ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub collection_name: String,
    pub content_kind: ContentKind,
    /// Records in the following chunk.
    pub record_count: i64,
    /// Serialized size of the following chunk in bytes.
    pub payload_byte_size: i64,
    pub total_record_count: i64,
    #[serde(default)]
    pub record_count_by_collection: BTreeMap<String, i64>,
}

/// What a manifest asks of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Exactly one chunk follows.
    Batch,
    /// No chunk follows; the session ends with this outcome.
    Terminal(TerminalOutcome),
}

impl Manifest {
    /// Manifest announcing a batch of `record_count` records from `collection`.
    pub fn batch(
        collection: &CollectionDescriptor,
        record_count: i64,
        payload_byte_size: i64,
        totals: &RecordCount,
    ) -> Self {
        Self {
            collection_name: collection.name.clone(),
            content_kind: collection.content_kind,
            record_count,
            payload_byte_size,
            total_record_count: totals.total_record_count,
            record_count_by_collection: totals.per_collection_total.clone(),
        }
    }

    /// Terminal manifest carrying the session's final record count.
    pub fn terminal(outcome: TerminalOutcome, totals: &RecordCount) -> Self {
        Self {
            collection_name: outcome.marker().to_string(),
            content_kind: ContentKind::Json,
            record_count: 0,
            payload_byte_size: 0,
            total_record_count: totals.total_record_count,
            record_count_by_collection: totals.per_collection_total.clone(),
        }
    }

    pub fn kind(&self) -> ManifestKind {
        match self.collection_name.as_str() {
            SYNC_COMPLETE => ManifestKind::Terminal(TerminalOutcome::TransferComplete),
            DATA_UP_TO_DATE => ManifestKind::Terminal(TerminalOutcome::DataUpToDate),
            _ => ManifestKind::Batch,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), ManifestKind::Terminal(_))
    }

    /// Total the sender owes for `collection` this session, if it reported one.
    pub fn expected_total_for(&self, collection: &str) -> Option<i64> {
        self.record_count_by_collection.get(collection).copied()
    }

    /// Structural checks applied to every manifest read off the wire.
    pub fn validate(&self) -> Result<()> {
        if self.record_count < 0 || self.payload_byte_size < 0 || self.total_record_count < 0 {
            return Err(CoreError::InvalidManifest("negative count or size".into()));
        }
        if let Some((name, _)) = self.record_count_by_collection.iter().find(|(_, n)| **n < 0) {
            return Err(CoreError::InvalidManifest(format!(
                "negative total for collection {}",
                name
            )));
        }

        match self.kind() {
            ManifestKind::Terminal(_) => {
                if self.record_count != 0 || self.payload_byte_size != 0 {
                    return Err(CoreError::InvalidManifest(
                        "terminal manifest announces a chunk".into(),
                    ));
                }
            }
            ManifestKind::Batch => {
                if self.collection_name.is_empty() {
                    return Err(CoreError::InvalidManifest("empty collection name".into()));
                }
                if self.record_count == 0 {
                    return Err(CoreError::InvalidManifest(format!(
                        "empty batch for collection {}",
                        self.collection_name
                    )));
                }
            }
        }

        Ok(())
    }
}
