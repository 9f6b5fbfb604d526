//! # Replication Framing
//!
//! Frames are `[len: u32 BE][bincode body]`. The length prefix is handled by
//! `LengthDelimitedCodec`; `FrameCodec` adds the bincode layer on top.

use crate::domain::entry::Heads;
use crate::domain::errors::LogError;
use crate::MAX_FRAME_LEN;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// A replication message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame each side sends.
    Handshake { log_id: String, heads: Heads },
    /// One log entry.
    Entry {
        origin: String,
        seq: u64,
        value: Vec<u8>,
    },
}

/// Codec for replication frames.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    /// Create a codec accepting frames up to `MAX_FRAME_LEN`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    /// Create a codec with a custom frame size limit.
    #[must_use]
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .big_endian()
                .max_frame_length(max)
                .new_codec(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = LogError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, LogError> {
        let Some(body) = self.inner.decode(src)? else {
            return Ok(None);
        };
        bincode::deserialize(&body)
            .map(Some)
            .map_err(|e| LogError::Protocol(e.to_string()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, LogError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(LogError::Protocol("truncated frame".to_string())),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = LogError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), LogError> {
        let body = bincode::serialize(&frame).map_err(|e| LogError::Protocol(e.to_string()))?;
        self.inner.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}
