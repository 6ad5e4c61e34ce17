//! Record accounting and checkpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionSet;
use crate::identity::AppLifetimeKey;

/// Record identifiers are monotonically increasing per collection.
pub type RecordId = i64;

/// Last record id the receiver already holds, per collection name.
pub type CheckpointSeed = BTreeMap<String, RecordId>;

/// Records owed to the receiver for one session.
///
/// Computed once from the checkpoint seed and never recomputed mid-session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCount {
    pub total_record_count: i64,
    pub per_collection_total: BTreeMap<String, i64>,
}

impl RecordCount {
    /// Build from per-collection totals; the overall total is their sum.
    pub fn from_per_collection(totals: impl IntoIterator<Item = (String, i64)>) -> Self {
        let per_collection_total: BTreeMap<String, i64> = totals.into_iter().collect();
        let total_record_count = per_collection_total.values().sum();
        Self {
            total_record_count,
            per_collection_total,
        }
    }

    pub fn for_collection(&self, name: &str) -> i64 {
        self.per_collection_total.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total_record_count == 0
    }
}

/// A receiver's high-water mark for one collection from one sending peer.
///
/// Unique per `(sending_peer_key, collection_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEntry {
    pub sending_peer_key: AppLifetimeKey,
    pub collection_name: String,
    pub last_processed_record_id: RecordId,
}

impl CheckpointEntry {
    pub fn new(
        sending_peer_key: AppLifetimeKey,
        collection_name: impl Into<String>,
        last_processed_record_id: RecordId,
    ) -> Self {
        Self {
            sending_peer_key,
            collection_name: collection_name.into(),
            last_processed_record_id,
        }
    }
}

/// Seed every offered collection from the receiver's history, 0 when absent.
///
/// History entries for collections the sender does not offer are ignored.
pub fn checkpoint_seed(collections: &CollectionSet, history: &[CheckpointEntry]) -> CheckpointSeed {
    collections
        .iter()
        .map(|collection| {
            let last = history
                .iter()
                .find(|entry| entry.collection_name == collection.name)
                .map(|entry| entry.last_processed_record_id)
                .unwrap_or(0);
            (collection.name.clone(), last)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionDescriptor;

    #[test]
    fn test_record_count_sums() {
        let count = RecordCount::from_per_collection([
            ("Group".to_string(), 0),
            ("Patient".to_string(), 3),
            ("Encounter".to_string(), 40),
        ]);
        assert_eq!(count.total_record_count, 43);
        assert_eq!(count.for_collection("Encounter"), 40);
        assert_eq!(count.for_collection("Unknown"), 0);
        assert!(!count.is_empty());
    }

    #[test]
    fn test_seed_defaults_to_zero() {
        let collections = CollectionSet::new([
            CollectionDescriptor::json("Group", 0),
            CollectionDescriptor::json("Patient", 1),
        ])
        .unwrap();
        let key = AppLifetimeKey::new("sender").unwrap();
        let history = vec![
            CheckpointEntry::new(key.clone(), "Patient", 9),
            CheckpointEntry::new(key, "Retired", 100),
        ];

        let seed = checkpoint_seed(&collections, &history);
        assert_eq!(seed.len(), 2);
        assert_eq!(seed["Group"], 0);
        assert_eq!(seed["Patient"], 9);
    }

    #[test]
    fn test_checkpoint_entry_json() {
        let entry = CheckpointEntry::new(AppLifetimeKey::new("k").unwrap(), "Patient", 13);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"sendingPeerKey":"k","collectionName":"Patient","lastProcessedRecordId":13}"#
        );
    }
}
