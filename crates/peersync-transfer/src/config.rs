//! Transfer configuration.

use serde::{Deserialize, Serialize};

use crate::frame::limits;

/// Configuration for the sync engines and framing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Records fetched per page and sent per chunk.
    pub batch_size: usize,
    /// Largest BYTES frame a reader will accept.
    pub max_payload_bytes: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_payload_bytes: limits::DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}
