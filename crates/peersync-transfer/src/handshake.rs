//! Basic identity handshake.
//!
//! ```text
//! Sender                                   Receiver
//!   |-- STRING {app-lifetime-key, device-id} -->|
//!   |<-------- STRING [CheckpointEntry, ...] ---|
//! ```
//!
//! The receiver's reply seeds the sender's checkpoints. An empty array means
//! the receiver has never synced with this sender.

use tokio::io::{AsyncRead, AsyncWrite};

use peersync_core::{AppLifetimeKey, CheckpointEntry, DeviceDetails};
use peersync_store::CheckpointStore;

use crate::error::{Result, TransferError};
use crate::frame::{FrameReader, FrameWriter};

/// Sender side: announce our identity, then read the receiver's history for us.
pub async fn initiate<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    details: &DeviceDetails,
) -> Result<Vec<CheckpointEntry>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(details)
        .map_err(|e| TransferError::violation(format!("device details encoding failed: {}", e)))?;
    writer.write_text(&json).await?;

    let reply = reader.read_text().await?;
    let history: Vec<CheckpointEntry> = serde_json::from_str(&reply)
        .map_err(|e| TransferError::violation(format!("malformed checkpoint history: {}", e)))?;

    let returned = history.len();
    let ours = history_for(&details.app_lifetime_key, history);
    if ours.len() < returned {
        tracing::warn!(
            ignored = returned - ours.len(),
            "receiver returned checkpoints for another sender"
        );
    }

    tracing::debug!(entries = ours.len(), "received checkpoint history");
    Ok(ours)
}

/// Receiver side: read the sender's identity and reply with its stored history.
pub async fn respond<R, W, S>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    store: &S,
) -> Result<DeviceDetails>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: CheckpointStore + ?Sized,
{
    let text = reader.read_text().await?;
    let details: DeviceDetails = serde_json::from_str(&text)
        .map_err(|e| TransferError::violation(format!("malformed device details: {}", e)))?;
    details.validate()?;

    let history = store.get_history(&details.app_lifetime_key).await?;
    send_history(writer, &history).await?;

    tracing::debug!(
        peer = %details.app_lifetime_key,
        device = %details.device_id,
        entries = history.len(),
        "sent checkpoint history"
    );
    Ok(details)
}

async fn send_history<W: AsyncWrite + Unpin>(
    writer: &mut FrameWriter<W>,
    history: &[CheckpointEntry],
) -> Result<()> {
    let json = serde_json::to_string(history)
        .map_err(|e| TransferError::violation(format!("history encoding failed: {}", e)))?;
    writer.write_text(&json).await
}

/// Keep only entries recorded for `peer`.
pub fn history_for(peer: &AppLifetimeKey, history: Vec<CheckpointEntry>) -> Vec<CheckpointEntry> {
    history
        .into_iter()
        .filter(|entry| &entry.sending_peer_key == peer)
        .collect()
}
