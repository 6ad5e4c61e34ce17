//! Collection descriptors and the ordered set the sender drains.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::manifest::{DATA_UP_TO_DATE, SYNC_COMPLETE};

/// How a collection's records are serialized on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "JPEG")]
    Jpeg,
}

impl ContentKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentKind::Json => "text/json",
            ContentKind::Png => "image/png",
            ContentKind::Jpeg => "image/jpeg",
        }
    }

    /// True for kinds whose records are opaque blobs.
    pub fn is_binary(&self) -> bool {
        !matches!(self, ContentKind::Json)
    }
}

/// A typed record collection offered by the sender.
///
/// Ordered by `sync_order`, then by name so that the ordering stays total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub content_kind: ContentKind,
    pub sync_order: i32,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, content_kind: ContentKind, sync_order: i32) -> Self {
        Self {
            name: name.into(),
            content_kind,
            sync_order,
        }
    }

    pub fn json(name: impl Into<String>, sync_order: i32) -> Self {
        Self::new(name, ContentKind::Json, sync_order)
    }
}

impl Ord for CollectionDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sync_order
            .cmp(&other.sync_order)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for CollectionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collections pending transfer, unique by name, iterated in ascending `sync_order`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSet {
    inner: BTreeSet<CollectionDescriptor>,
}

impl CollectionSet {
    /// Build a set, rejecting duplicate and reserved names.
    pub fn new(collections: impl IntoIterator<Item = CollectionDescriptor>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut inner = BTreeSet::new();

        for collection in collections {
            if collection.name == SYNC_COMPLETE || collection.name == DATA_UP_TO_DATE {
                return Err(CoreError::ReservedCollectionName(collection.name));
            }
            if !names.insert(collection.name.clone()) {
                return Err(CoreError::DuplicateCollection(collection.name));
            }
            inner.insert(collection);
        }

        Ok(Self { inner })
    }

    /// Lowest `sync_order` collection still pending.
    pub fn first(&self) -> Option<&CollectionDescriptor> {
        self.inner.first()
    }

    /// Remove and return the lowest `sync_order` collection.
    pub fn pop_first(&mut self) -> Option<CollectionDescriptor> {
        self.inner.pop_first()
    }

    pub fn get(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.inner.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDescriptor> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<'a> IntoIterator for &'a CollectionSet {
    type Item = &'a CollectionDescriptor;
    type IntoIter = std::collections::btree_set::Iter<'a, CollectionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
