//! Proptest generators for property-based testing.

use std::ops::RangeInclusive;

use bytes::Bytes;
use proptest::prelude::*;

use peersync_core::{AppLifetimeKey, CheckpointEntry, CollectionDescriptor, ContentKind, RecordId};
use peersync_transfer::source::memory::MemorySource;

/// Generate a ContentKind.
pub fn content_kind() -> impl Strategy<Value = ContentKind> {
    prop_oneof![
        Just(ContentKind::Json),
        Just(ContentKind::Png),
        Just(ContentKind::Jpeg),
    ]
}

/// Generate a collection name. Never collides with a terminal marker.
pub fn collection_name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,10}".prop_map(String::from)
}

/// One collection in a generated scenario.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub descriptor: CollectionDescriptor,
    /// What the receiver already holds. 0 means never synced.
    pub checkpoint: RecordId,
    /// Records the sender holds after the checkpoint.
    pub owed: i64,
}

impl CollectionPlan {
    /// Ids the sender holds past the checkpoint: `checkpoint+1 ..= checkpoint+owed`.
    pub fn record_ids(&self) -> RangeInclusive<RecordId> {
        (self.checkpoint + 1)..=(self.checkpoint + self.owed)
    }

    /// Checkpoint expected after a full session.
    pub fn expected_checkpoint(&self) -> Option<RecordId> {
        match (self.owed, self.checkpoint) {
            (0, 0) => None,
            (0, checkpoint) => Some(checkpoint),
            (owed, checkpoint) => Some(checkpoint + owed + 1),
        }
    }
}

/// Generate a scenario of up to `max_collections` uniquely named collections.
pub fn sync_plan(max_collections: usize) -> impl Strategy<Value = Vec<CollectionPlan>> {
    prop::collection::btree_map(
        collection_name(),
        (-5i32..20, content_kind(), 0i64..500, 0i64..60),
        1..=max_collections.max(1),
    )
    .prop_map(|collections| {
        collections
            .into_iter()
            .map(|(name, (order, kind, checkpoint, owed))| CollectionPlan {
                descriptor: CollectionDescriptor::new(name, kind, order),
                checkpoint,
                owed,
            })
            .collect()
    })
}

/// A source holding exactly the records each plan owes.
pub fn source_for(plans: &[CollectionPlan]) -> MemorySource {
    plans.iter().fold(MemorySource::new(), |source, plan| {
        let descriptor = plan.descriptor.clone();
        if descriptor.content_kind.is_binary() {
            let blobs = plan
                .record_ids()
                .map(|id| (id, Bytes::from(id.to_be_bytes().to_vec())));
            source.with_binary_records(descriptor, blobs)
        } else {
            source.with_json_records(descriptor, plan.record_ids())
        }
    })
}

/// Receiver history matching each plan's checkpoint.
pub fn history_for(sender: &AppLifetimeKey, plans: &[CollectionPlan]) -> Vec<CheckpointEntry> {
    plans
        .iter()
        .filter(|plan| plan.checkpoint > 0)
        .map(|plan| {
            CheckpointEntry::new(sender.clone(), plan.descriptor.name.clone(), plan.checkpoint)
        })
        .collect()
}
