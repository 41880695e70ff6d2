use std::io::{ErrorKind, Write};

use agentlink_transport::Connection;
use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig, LENGTH_PREFIX_SIZE};
use crate::envelope::{self, Envelope};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete envelopes to any `Write` stream.
///
/// The length prefix and payload are staged in one buffer, prefix first, and
/// written in a loop until every byte is accepted. Any write error other than
/// `Interrupted` is returned immediately.
pub struct EnvelopeWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> EnvelopeWriter<T> {
    /// Create a new writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one envelope (blocking).
    pub fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let size = envelope.encoded_len();
        self.check_size(size)?;

        self.buf.clear();
        self.buf.reserve(LENGTH_PREFIX_SIZE + size);
        // `check_size` bounds `size` by u32::MAX.
        self.buf.put_u32_le(size as u32);
        envelope::encode_into(envelope, &mut self.buf);

        trace!(id = envelope.id, msg_type = envelope.msg_type, len = size, "sending envelope");
        self.write_staged()
    }

    /// Send an already-encoded frame payload (blocking).
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.check_size(payload.len())?;
        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;
        self.write_staged()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn check_size(&self, size: usize) -> Result<()> {
        let max = self.config.max_frame_size.min(u32::MAX as usize);
        if size > max {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        Ok(())
    }

    fn write_staged(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }
}

impl EnvelopeWriter<Connection> {
    /// Create a writer for a `Connection` and apply the write timeout from config.
    pub fn with_config_conn(inner: Connection, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
