//! Chunk payload codec.
//!
//! JSON collections travel as a JSON array. Binary collections (PNG, JPEG)
//! travel as a sequence of `[i64 id][u64 len][bytes]` entries.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;

use peersync_core::{ContentKind, RecordId};

use crate::error::{Result, TransferError};

/// One opaque record from a binary collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    pub id: RecordId,
    pub data: Bytes,
}

/// A batch of records from a single collection.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBatch {
    Json(Vec<Value>),
    Binary(Vec<BinaryRecord>),
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Json(records) => records.len(),
            RecordBatch::Binary(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this batch can be carried for a collection of `kind`.
    pub fn fits(&self, kind: ContentKind) -> bool {
        match self {
            RecordBatch::Json(_) => !kind.is_binary(),
            RecordBatch::Binary(_) => kind.is_binary(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            RecordBatch::Json(records) => serde_json::to_vec(records)
                .map(Bytes::from)
                .map_err(|e| TransferError::violation(format!("batch encoding failed: {}", e))),
            RecordBatch::Binary(records) => {
                let size: usize = records.iter().map(|r| 16 + r.data.len()).sum();
                let mut buf = BytesMut::with_capacity(size);
                for record in records {
                    buf.put_i64(record.id);
                    buf.put_u64(record.data.len() as u64);
                    buf.put_slice(&record.data);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn decode(kind: ContentKind, payload: Bytes) -> Result<Self> {
        if !kind.is_binary() {
            let records: Vec<Value> = serde_json::from_slice(&payload)
                .map_err(|e| TransferError::violation(format!("malformed JSON batch: {}", e)))?;
            return Ok(RecordBatch::Json(records));
        }

        let mut buf = payload;
        let mut records = Vec::new();
        while buf.has_remaining() {
            if buf.remaining() < 16 {
                return Err(TransferError::violation("truncated binary record header"));
            }
            let id = buf.get_i64();
            let len = buf.get_u64();
            if len > buf.remaining() as u64 {
                return Err(TransferError::violation(format!(
                    "binary record {} claims {} bytes, {} left",
                    id,
                    len,
                    buf.remaining()
                )));
            }
            let data = buf.split_to(len as usize);
            records.push(BinaryRecord { id, data });
        }
        Ok(RecordBatch::Binary(records))
    }
}
