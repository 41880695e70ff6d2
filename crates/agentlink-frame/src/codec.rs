use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a 4-byte little-endian payload length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame payload size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Encode one frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length (4B LE)│ Payload          │
/// │              │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32_le(len);
    dst.put_slice(payload);
    Ok(())
}

/// Read the length prefix at the start of `src`, if all four bytes are there.
pub fn peek_length(src: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = src.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(prefix) as usize)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// The length is checked against `max_payload` as soon as the prefix is
/// available, before any payload bytes are buffered. On success, consumes the
/// frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some(payload_len) = peek_length(src) else {
        return Ok(None);
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < LENGTH_PREFIX_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Describe the partial frame left in `src` when the stream ended early.
///
/// Returns `None` when `src` is empty, i.e. the stream ended on a frame
/// boundary.
pub fn truncation(src: &[u8]) -> Option<FrameError> {
    if src.is_empty() {
        return None;
    }
    Some(match peek_length(src) {
        Some(expected) => FrameError::Truncated {
            expected,
            received: src.len() - LENGTH_PREFIX_SIZE,
        },
        None => FrameError::Truncated {
            expected: LENGTH_PREFIX_SIZE,
            received: src.len(),
        },
    })
}

/// Configuration for framed connections.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame payload size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
