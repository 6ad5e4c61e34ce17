//! Host-supplied record source and sink.
//!
//! The sender pages records out of a [`SenderDataSource`]; the receiver hands
//! each decoded batch to a [`ReceiverDataSink`]. Both are implemented by the
//! host application. Errors are reported as `anyhow::Error` and wrapped by
//! the engines into [`TransferError`](crate::TransferError) variants.

use async_trait::async_trait;

use peersync_core::{CheckpointSeed, CollectionDescriptor, CollectionSet, RecordCount, RecordId};

use crate::batch::RecordBatch;

/// One page of records fetched for a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: RecordBatch,
    /// Highest record id in this page. Meaningless when the page is empty.
    pub highest_id: RecordId,
}

impl RecordPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where the sender reads records from.
#[async_trait]
pub trait SenderDataSource: Send + Sync {
    /// Collections offered this session.
    async fn collections(&self) -> anyhow::Result<CollectionSet>;

    /// Records owed per collection given the receiver's checkpoints.
    async fn total_record_count(&self, seed: &CheckpointSeed) -> anyhow::Result<RecordCount>;

    /// Records with id greater than `after_id`, ascending by id, skipping `offset`,
    /// at most `limit`.
    async fn page(
        &self,
        collection: &CollectionDescriptor,
        after_id: RecordId,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<RecordPage>;
}

/// Where the receiver writes records to.
#[async_trait]
pub trait ReceiverDataSink: Send + Sync {
    /// Durably apply a batch. Returns the highest record id applied.
    async fn apply(&self, collection: &str, records: RecordBatch) -> anyhow::Result<RecordId>;
}

/// In-memory source and sink for tests and demos.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use anyhow::{anyhow, bail};
    use bytes::Bytes;
    use serde_json::Value;

    use crate::batch::BinaryRecord;

    /// A `page` call observed by [`MemorySource`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PageRequest {
        pub collection: String,
        pub after_id: RecordId,
        pub limit: usize,
        pub offset: usize,
    }

    #[derive(Debug, Clone)]
    enum Body {
        Json(Value),
        Binary(Bytes),
    }

    struct Collection {
        descriptor: CollectionDescriptor,
        records: BTreeMap<RecordId, Body>,
    }

    /// In-memory [`SenderDataSource`]. Records every page request it serves.
    #[derive(Default)]
    pub struct MemorySource {
        collections: BTreeMap<String, Collection>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a collection with no records.
        pub fn with_collection(mut self, descriptor: CollectionDescriptor) -> Self {
            self.collections.insert(
                descriptor.name.clone(),
                Collection {
                    descriptor,
                    records: BTreeMap::new(),
                },
            );
            self
        }

        /// Register a JSON collection whose records are `{"id": <id>, ...}` objects.
        pub fn with_json_records(
            mut self,
            descriptor: CollectionDescriptor,
            ids: impl IntoIterator<Item = RecordId>,
        ) -> Self {
            let records = ids
                .into_iter()
                .map(|id| {
                    let body = serde_json::json!({ "id": id, "collection": descriptor.name });
                    (id, Body::Json(body))
                })
                .collect();
            self.collections
                .insert(descriptor.name.clone(), Collection { descriptor, records });
            self
        }

        /// Register a binary collection.
        pub fn with_binary_records(
            mut self,
            descriptor: CollectionDescriptor,
            records: impl IntoIterator<Item = (RecordId, Bytes)>,
        ) -> Self {
            let records = records
                .into_iter()
                .map(|(id, data)| (id, Body::Binary(data)))
                .collect();
            self.collections
                .insert(descriptor.name.clone(), Collection { descriptor, records });
            self
        }

        /// Every page request served so far, in call order.
        pub fn page_requests(&self) -> Vec<PageRequest> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SenderDataSource for MemorySource {
        async fn collections(&self) -> anyhow::Result<CollectionSet> {
            Ok(CollectionSet::new(
                self.collections.values().map(|c| c.descriptor.clone()),
            )?)
        }

        async fn total_record_count(&self, seed: &CheckpointSeed) -> anyhow::Result<RecordCount> {
            Ok(RecordCount::from_per_collection(self.collections.iter().map(
                |(name, collection)| {
                    let after = seed.get(name).copied().unwrap_or(0);
                    let owed = collection.records.range(after.saturating_add(1)..).count() as i64;
                    (name.clone(), owed)
                },
            )))
        }

        async fn page(
            &self,
            collection: &CollectionDescriptor,
            after_id: RecordId,
            limit: usize,
            offset: usize,
        ) -> anyhow::Result<RecordPage> {
            self.requests
                .lock()
                .map_err(|_| anyhow!("request log poisoned"))?
                .push(PageRequest {
                    collection: collection.name.clone(),
                    after_id,
                    limit,
                    offset,
                });

            let stored = self
                .collections
                .get(&collection.name)
                .ok_or_else(|| anyhow!("unknown collection {}", collection.name))?;

            let selected: Vec<(RecordId, &Body)> = stored
                .records
                .range(after_id.saturating_add(1)..)
                .skip(offset)
                .take(limit)
                .map(|(id, body)| (*id, body))
                .collect();
            let highest_id = selected.last().map(|(id, _)| *id).unwrap_or(after_id);

            let records = if collection.content_kind.is_binary() {
                let mut out = Vec::with_capacity(selected.len());
                for (id, body) in selected {
                    match body {
                        Body::Binary(data) => out.push(BinaryRecord {
                            id,
                            data: data.clone(),
                        }),
                        Body::Json(_) => {
                            bail!("record {} in {} is not binary", id, collection.name)
                        }
                    }
                }
                RecordBatch::Binary(out)
            } else {
                let mut out = Vec::with_capacity(selected.len());
                for (id, body) in selected {
                    match body {
                        Body::Json(value) => out.push(value.clone()),
                        Body::Binary(_) => {
                            bail!("record {} in {} is not JSON", id, collection.name)
                        }
                    }
                }
                RecordBatch::Json(out)
            };

            Ok(RecordPage { records, highest_id })
        }
    }

    /// In-memory [`ReceiverDataSink`]. JSON records must carry an integer `id` field.
    #[derive(Default)]
    pub struct MemorySink {
        applied: Mutex<BTreeMap<String, Vec<RecordId>>>,
        failing: Mutex<HashSet<String>>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject every batch for `collection` until [`MemorySink::recover`] is called.
        pub fn fail_collection(&self, collection: &str) {
            if let Ok(mut failing) = self.failing.lock() {
                failing.insert(collection.to_string());
            }
        }

        pub fn recover(&self, collection: &str) {
            if let Ok(mut failing) = self.failing.lock() {
                failing.remove(collection);
            }
        }

        /// Record ids applied for a collection, in arrival order.
        pub fn applied_ids(&self, collection: &str) -> Vec<RecordId> {
            self.applied
                .lock()
                .ok()
                .and_then(|applied| applied.get(collection).cloned())
                .unwrap_or_default()
        }

        pub fn applied_count(&self) -> usize {
            self.applied
                .lock()
                .map(|applied| applied.values().map(Vec::len).sum())
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl ReceiverDataSink for MemorySink {
        async fn apply(&self, collection: &str, records: RecordBatch) -> anyhow::Result<RecordId> {
            if self
                .failing
                .lock()
                .map_err(|_| anyhow!("sink poisoned"))?
                .contains(collection)
            {
                bail!("sink rejected batch for {}", collection);
            }

            let ids: Vec<RecordId> = match &records {
                RecordBatch::Json(values) => values
                    .iter()
                    .map(|v| {
                        v.get("id")
                            .and_then(Value::as_i64)
                            .ok_or_else(|| anyhow!("record without integer id in {}", collection))
                    })
                    .collect::<anyhow::Result<_>>()?,
                RecordBatch::Binary(blobs) => blobs.iter().map(|b| b.id).collect(),
            };
            let highest = ids
                .iter()
                .copied()
                .max()
                .ok_or_else(|| anyhow!("empty batch for {}", collection))?;

            self.applied
                .lock()
                .map_err(|_| anyhow!("sink poisoned"))?
                .entry(collection.to_string())
                .or_default()
                .extend(ids);

            Ok(highest)
        }
    }
}
