/// Errors produced by the envelope codec.
///
/// A codec error affects only the message it was raised for; the frame
/// boundary has already been consumed, so the stream stays usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The envelope image is shorter than the fixed header.
    #[error("envelope truncated ({len} bytes, header needs {min})")]
    Truncated { len: usize, min: usize },

    /// Reserved flag bits are set.
    #[error("invalid envelope flags {0:#04x}")]
    InvalidFlags(u8),
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame length exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection ended in the middle of a frame.
    #[error("connection closed mid-frame (expected {expected} bytes, received {received})")]
    Truncated { expected: usize, received: usize },

    /// A complete frame was received but its envelope image is malformed.
    #[error("envelope decode failed: {0}")]
    Codec(#[from] CodecError),
}

impl FrameError {
    /// True for failures of the underlying byte stream.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FrameError::Io(_) | FrameError::ConnectionClosed | FrameError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
