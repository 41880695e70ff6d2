//! Length-prefixed envelope framing for agentlink.
//!
//! Every message on the wire is one frame:
//! - A 4-byte little-endian payload length
//! - Exactly that many payload bytes, holding one encoded [`Envelope`]
//!
//! Duplex transports deliver bytes in arbitrary chunks; the length prefix is
//! the only message boundary. Readers never hand a partial frame to the
//! envelope codec.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::EnvelopeCodec;
pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE};
pub use envelope::{decode, encode, Envelope, ENVELOPE_HEADER_SIZE};
pub use error::{CodecError, FrameError, Result};
pub use reader::EnvelopeReader;
pub use writer::EnvelopeWriter;
