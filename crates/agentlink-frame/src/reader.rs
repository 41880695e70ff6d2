use std::io::{ErrorKind, Read};

use agentlink_transport::Connection;
use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_frame, truncation, FrameConfig};
use crate::envelope::{self, Envelope};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete envelopes from any `Read` stream.
///
/// Handles partial reads internally: callers always get whole frames, and a
/// frame cut short by end-of-stream is an error rather than a short message.
/// The buffer only grows with bytes actually received, so a hostile length
/// prefix cannot force a large allocation.
///
/// After `PayloadTooLarge`, `Truncated` or an I/O error the stream position
/// is unknown and the reader should be discarded.
pub struct EnvelopeReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> EnvelopeReader<T> {
    /// Create a new reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame payload (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ends on a
    /// frame boundary and `Err(FrameError::Truncated { .. })` when it ends
    /// inside one.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
                trace!(len = payload.len(), "frame received");
                return Ok(payload);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(truncation(&self.buf).unwrap_or(FrameError::ConnectionClosed));
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read and decode the next envelope (blocking).
    ///
    /// A malformed envelope image yields `FrameError::Codec`; the frame has
    /// been consumed, so the next call reads the following frame.
    pub fn read_envelope(&mut self) -> Result<Envelope> {
        let payload = self.read_frame()?;
        Ok(envelope::decode(payload)?)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl EnvelopeReader<Connection> {
    /// Create a reader for a `Connection` and apply the read timeout from config.
    pub fn with_config_conn(inner: Connection, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: agentlink_transport::TransportError) -> FrameError {
    match err {
        agentlink_transport::TransportError::Io(io)
        | agentlink_transport::TransportError::Accept(io) => FrameError::Io(io),
        agentlink_transport::TransportError::Bind { source, .. }
        | agentlink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
