//! Framing layer.
//!
//! Every frame starts with a tag string. Strings on the wire are a 2-byte
//! big-endian length followed by UTF-8 bytes.
//!
//! ```text
//! MANIFEST : [u16 len]["MANIFEST"] [u16 len][manifest JSON]
//! STRING   : [u16 len]["STRING"]   [u16 len][text]
//! BYTES    : [u16 len]["BYTES"]    [u64 len][body, written in <= 1024 byte pieces]
//! ```
//!
//! The stream is single-flight. After each chunk, and after the terminal
//! manifest, the receiver answers with a STRING frame holding [`READY`]; the
//! sender writes nothing further until it has read that answer.
//!
//! Any I/O error invalidates the session. The framing layer never retries.

use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};

use peersync_core::Manifest;

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};

/// Framing limits.
pub mod limits {
    /// Maximum bytes moved per read/write call for BYTES bodies.
    pub const IO_CHUNK_SIZE: usize = 1024;
    /// Longest tag, STRING or MANIFEST body.
    pub const MAX_UTF_LEN: usize = u16::MAX as usize;
    /// Default ceiling on an accepted BYTES body.
    pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;
}

/// Receiver acknowledgement of an applied chunk or a terminal manifest.
pub const READY: &str = "READY";

/// Leading tag of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    Manifest,
    String,
    Bytes,
}

impl FrameTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameTag::Manifest => "MANIFEST",
            FrameTag::String => "STRING",
            FrameTag::Bytes => "BYTES",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "MANIFEST" => Some(FrameTag::Manifest),
            "STRING" => Some(FrameTag::String),
            "BYTES" => Some(FrameTag::Bytes),
            _ => None,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Manifest(Manifest),
    Text(String),
    Bytes(Bytes),
}

impl Frame {
    pub fn tag(&self) -> FrameTag {
        match self {
            Frame::Manifest(_) => FrameTag::Manifest,
            Frame::Text(_) => FrameTag::String,
            Frame::Bytes(_) => FrameTag::Bytes,
        }
    }
}

/// Writes frames to an async byte sink. Each frame is flushed once complete.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_manifest(&mut self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_string(manifest)
            .map_err(|e| TransferError::violation(format!("manifest encoding failed: {}", e)))?;
        check_utf_len(&json)?;

        self.write_utf(FrameTag::Manifest.as_str()).await?;
        self.write_utf(&json).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_text(&mut self, text: &str) -> Result<()> {
        check_utf_len(text)?;

        self.write_utf(FrameTag::String.as_str()).await?;
        self.write_utf(text).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.write_utf(FrameTag::Bytes.as_str()).await?;
        self.inner.write_u64(payload.len() as u64).await?;
        for piece in payload.chunks(limits::IO_CHUNK_SIZE) {
            self.inner.write_all(piece).await?;
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Acknowledge the last exchange.
    pub async fn write_ready(&mut self) -> Result<()> {
        self.write_text(READY).await
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        match frame {
            Frame::Manifest(manifest) => self.write_manifest(manifest).await,
            Frame::Text(text) => self.write_text(text).await,
            Frame::Bytes(payload) => self.write_bytes(payload).await,
        }
    }

    /// Flush and shut down the write side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    async fn write_utf(&mut self, text: &str) -> Result<()> {
        check_utf_len(text)?;
        self.inner.write_u16(text.len() as u16).await?;
        self.inner.write_all(text.as_bytes()).await?;
        Ok(())
    }
}

fn check_utf_len(text: &str) -> Result<()> {
    if text.len() > limits::MAX_UTF_LEN {
        return Err(TransferError::violation(format!(
            "text frame of {} bytes exceeds {}",
            text.len(),
            limits::MAX_UTF_LEN
        )));
    }
    Ok(())
}

/// Reads frames from an async byte source.
pub struct FrameReader<R> {
    inner: R,
    max_payload_bytes: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_payload_bytes: limits::DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload(mut self, max_payload_bytes: u64) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    /// Read the next frame of any kind. Manifests are validated before return.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let tag = self.read_utf().await?;

        match FrameTag::parse(&tag) {
            Some(FrameTag::Manifest) => {
                let json = self.read_utf().await?;
                let manifest: Manifest = serde_json::from_str(&json)
                    .map_err(|e| TransferError::violation(format!("malformed manifest: {}", e)))?;
                manifest.validate()?;
                Ok(Frame::Manifest(manifest))
            }
            Some(FrameTag::String) => Ok(Frame::Text(self.read_utf().await?)),
            Some(FrameTag::Bytes) => Ok(Frame::Bytes(self.read_bytes_body().await?)),
            None => Err(TransferError::violation(format!(
                "unknown frame tag {:?}",
                tag.chars().take(32).collect::<String>()
            ))),
        }
    }

    /// Read a frame that must be a manifest.
    pub async fn read_manifest(&mut self) -> Result<Manifest> {
        match self.read_frame().await? {
            Frame::Manifest(manifest) => Ok(manifest),
            other => Err(unexpected(FrameTag::Manifest, &other)),
        }
    }

    /// Read a frame that must be a STRING.
    pub async fn read_text(&mut self) -> Result<String> {
        match self.read_frame().await? {
            Frame::Text(text) => Ok(text),
            other => Err(unexpected(FrameTag::String, &other)),
        }
    }

    /// Wait for the peer to acknowledge the last exchange.
    pub async fn read_ready(&mut self) -> Result<()> {
        let text = self.read_text().await?;
        if text != READY {
            return Err(TransferError::violation(format!(
                "expected {} acknowledgement, got {:?}",
                READY,
                text.chars().take(32).collect::<String>()
            )));
        }
        Ok(())
    }

    /// Read a chunk payload, carried either as BYTES or as STRING.
    pub async fn read_chunk(&mut self) -> Result<Bytes> {
        match self.read_frame().await? {
            Frame::Bytes(payload) => Ok(payload),
            Frame::Text(text) => Ok(Bytes::from(text)),
            other => Err(unexpected(FrameTag::Bytes, &other)),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_utf(&mut self) -> Result<String> {
        let len = self.inner.read_u16().await? as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        String::from_utf8(buf)
            .map_err(|_| TransferError::violation("frame text is not valid UTF-8"))
    }

    async fn read_bytes_body(&mut self) -> Result<Bytes> {
        let len = self.inner.read_u64().await?;
        if len > self.max_payload_bytes {
            return Err(TransferError::violation(format!(
                "BYTES frame of {} bytes exceeds limit {}",
                len, self.max_payload_bytes
            )));
        }

        let mut body = BytesMut::with_capacity(len as usize);
        let mut piece = [0u8; limits::IO_CHUNK_SIZE];
        let mut remaining = len as usize;
        while remaining > 0 {
            let n = remaining.min(limits::IO_CHUNK_SIZE);
            self.inner.read_exact(&mut piece[..n]).await?;
            body.extend_from_slice(&piece[..n]);
            remaining -= n;
        }

        Ok(body.freeze())
    }
}

fn unexpected(expected: FrameTag, got: &Frame) -> TransferError {
    TransferError::violation(format!(
        "expected {} frame, got {}",
        expected.as_str(),
        got.tag().as_str()
    ))
}

/// The one buffered reader/writer pair a session owns over its stream.
pub struct FramedStream<S> {
    reader: FrameReader<BufReader<ReadHalf<S>>>,
    writer: FrameWriter<BufWriter<WriteHalf<S>>>,
}

impl<S: AsyncRead + AsyncWrite> FramedStream<S> {
    pub fn new(stream: S, config: &TransferConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(BufReader::new(read_half))
                .with_max_payload(config.max_payload_bytes),
            writer: FrameWriter::new(BufWriter::new(write_half)),
        }
    }

    pub fn reader(&mut self) -> &mut FrameReader<BufReader<ReadHalf<S>>> {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut FrameWriter<BufWriter<WriteHalf<S>>> {
        &mut self.writer
    }

    /// Borrow both halves at once.
    pub fn split_mut(
        &mut self,
    ) -> (
        &mut FrameReader<BufReader<ReadHalf<S>>>,
        &mut FrameWriter<BufWriter<WriteHalf<S>>>,
    ) {
        (&mut self.reader, &mut self.writer)
    }

    /// Shut down the write side and drop the stream.
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_core::{CollectionDescriptor, RecordCount};
    use proptest::prelude::*;

    async fn encode(frame: &Frame) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(frame).await.unwrap();
        writer.into_inner()
    }

    #[tokio::test]
    async fn test_string_frame_wire_bytes() {
        let bytes = encode(&Frame::Text("hi".into())).await;
        assert_eq!(bytes, b"\x00\x06STRING\x00\x02hi".to_vec());
    }

    #[tokio::test]
    async fn test_bytes_frame_has_u64_length() {
        let bytes = encode(&Frame::Bytes(Bytes::from_static(b"abc"))).await;
        let mut expected = b"\x00\x05BYTES".to_vec();
        expected.extend_from_slice(&3u64.to_be_bytes());
        expected.extend_from_slice(b"abc");
        assert_eq!(bytes, expected);
    }

    #[tokio::test]
    async fn test_manifest_frame_over_duplex() {
        let (a, b) = tokio::io::duplex(256);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        let totals = RecordCount::from_per_collection([("Patient".to_string(), 3)]);
        let manifest = Manifest::batch(&CollectionDescriptor::json("Patient", 1), 3, 42, &totals);

        let sent = manifest.clone();
        let write = tokio::spawn(async move { writer.write_manifest(&sent).await });

        let got = reader.read_manifest().await.unwrap();
        write.await.unwrap().unwrap();
        assert_eq!(got, manifest);
    }

    #[tokio::test]
    async fn test_large_payload_crosses_small_pipe() {
        let (a, b) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b);

        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let sent = payload.clone();
        let write = tokio::spawn(async move { writer.write_bytes(&sent).await });

        let got = reader.read_chunk().await.unwrap();
        write.await.unwrap().unwrap();
        assert_eq!(got.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_violation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(b"\x00\x04JUNK");
        let mut reader = FrameReader::new(wire.as_slice());

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_wrong_frame_kind_is_violation() {
        let bytes = encode(&Frame::Text("not a manifest".into())).await;
        let mut reader = FrameReader::new(bytes.as_slice());

        let err = reader.read_manifest().await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_violation() {
        let mut wire = b"\x00\x08MANIFEST".to_vec();
        wire.extend_from_slice(&(5u16).to_be_bytes());
        wire.extend_from_slice(b"{oops");
        let mut reader = FrameReader::new(wire.as_slice());

        let err = reader.read_manifest().await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_transport_error() {
        let bytes = encode(&Frame::Bytes(Bytes::from(vec![7u8; 100]))).await;
        let mut reader = FrameReader::new(&bytes[..50]);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransferError::Transport(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let bytes = encode(&Frame::Bytes(Bytes::from(vec![1u8; 2048]))).await;
        let mut reader = FrameReader::new(bytes.as_slice()).with_max_payload(1024);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_overlong_text_rejected_on_write() {
        let mut writer = FrameWriter::new(Vec::new());
        let text = "x".repeat(limits::MAX_UTF_LEN + 1);

        let err = writer.write_text(&text).await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
        assert!(writer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_string_chunk_accepted() {
        let bytes = encode(&Frame::Text("[1,2]".into())).await;
        let mut reader = FrameReader::new(bytes.as_slice());
        assert_eq!(reader.read_chunk().await.unwrap(), Bytes::from_static(b"[1,2]"));
    }

    #[tokio::test]
    async fn test_ready_acknowledgement() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_ready().await.unwrap();
        writer.write_text("NOPE").await.unwrap();
        let wire = writer.into_inner();

        let mut reader = FrameReader::new(wire.as_slice());
        reader.read_ready().await.unwrap();
        assert!(matches!(
            reader.read_ready().await,
            Err(TransferError::ProtocolViolation(_))
        ));
        assert!(matches!(
            reader.read_ready().await,
            Err(TransferError::Transport(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_bytes_frames_survive_framing(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let got = rt.block_on(async {
                let bytes = encode(&Frame::Bytes(Bytes::from(payload.clone()))).await;
                let mut reader = FrameReader::new(bytes.as_slice());
                reader.read_chunk().await.unwrap()
            });
            prop_assert_eq!(got.as_ref(), payload.as_slice());
        }
    }
}
