use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Envelope header: id (8) + type (4) + flags (1) = 13 bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 13;

const FLAG_UNKNOWN_TYPE: u8 = 0x01;
const KNOWN_FLAGS: u8 = FLAG_UNKNOWN_TYPE;

/// A self-contained application message.
///
/// The `data` body is opaque to agentlink; `msg_type` and `id` let the
/// application route messages and correlate replies with requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Correlation id. Replies carry the id of the request they answer.
    pub id: u64,
    /// Application-defined message type.
    pub msg_type: u32,
    /// Set on replies to requests whose type the receiver does not handle.
    pub unknown_type: bool,
    /// Opaque message body.
    pub data: Bytes,
}

impl Envelope {
    /// Create an envelope with id 0.
    pub fn new(msg_type: u32, data: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            msg_type,
            unknown_type: false,
            data: data.into(),
        }
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Build a reply that carries this envelope's correlation id.
    pub fn reply(&self, msg_type: u32, data: impl Into<Bytes>) -> Self {
        Self::new(msg_type, data).with_id(self.id)
    }

    /// Build the reply sent when this envelope's type is not understood.
    pub fn unknown_type_reply(&self) -> Self {
        Self {
            id: self.id,
            msg_type: self.msg_type,
            unknown_type: true,
            data: Bytes::new(),
        }
    }

    /// Size of this envelope's encoded image.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.data.len()
    }
}

/// Encode an envelope into its canonical byte image.
///
/// ```text
/// ┌────────────┬────────────┬───────────┬──────────────────┐
/// │ Id (8B LE) │ Type (4B LE)│ Flags (1B)│ Data (remaining) │
/// └────────────┴────────────┴───────────┴──────────────────┘
/// ```
pub fn encode(envelope: &Envelope) -> Bytes {
    let mut dst = BytesMut::with_capacity(envelope.encoded_len());
    encode_into(envelope, &mut dst);
    dst.freeze()
}

/// Append an envelope's byte image to `dst`.
pub fn encode_into(envelope: &Envelope, dst: &mut BytesMut) {
    let flags = if envelope.unknown_type {
        FLAG_UNKNOWN_TYPE
    } else {
        0
    };
    dst.reserve(envelope.encoded_len());
    dst.put_u64_le(envelope.id);
    dst.put_u32_le(envelope.msg_type);
    dst.put_u8(flags);
    dst.put_slice(&envelope.data);
}

/// Decode an envelope image. The data body shares the input buffer.
pub fn decode(mut src: Bytes) -> Result<Envelope, CodecError> {
    if src.len() < ENVELOPE_HEADER_SIZE {
        return Err(CodecError::Truncated {
            len: src.len(),
            min: ENVELOPE_HEADER_SIZE,
        });
    }

    let id = src.get_u64_le();
    let msg_type = src.get_u32_le();
    let flags = src.get_u8();
    if flags & !KNOWN_FLAGS != 0 {
        return Err(CodecError::InvalidFlags(flags));
    }

    Ok(Envelope {
        id,
        msg_type,
        unknown_type: flags & FLAG_UNKNOWN_TYPE != 0,
        data: src,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_across_payload_sizes() {
        for size in [0usize, 1, 12, 13, 1024, 64 * 1024] {
            let envelope = Envelope::new(7, vec![0x5A; size]).with_id(u64::MAX - size as u64);
            let decoded = decode(encode(&envelope)).unwrap();
            assert_eq!(decoded, envelope, "size {size}");
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let envelope = Envelope::new(3, "tasking").with_id(42);
        assert_eq!(encode(&envelope), encode(&envelope.clone()));
    }

    #[test]
    fn layout_is_little_endian() {
        let envelope = Envelope::new(0x0102_0304, "x").with_id(0x0A0B);
        let image = encode(&envelope);
        assert_eq!(
            image.as_ref(),
            &[0x0B, 0x0A, 0, 0, 0, 0, 0, 0, 0x04, 0x03, 0x02, 0x01, 0x00, b'x']
        );
    }

    #[test]
    fn unknown_type_flag_survives() {
        let request = Envelope::new(99, "?").with_id(5);
        let reply = request.unknown_type_reply();
        let decoded = decode(encode(&reply)).unwrap();
        assert!(decoded.unknown_type);
        assert_eq!(decoded.id, 5);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn truncated_header_fails() {
        let image = encode(&Envelope::new(1, "abc"));
        for len in 0..ENVELOPE_HEADER_SIZE {
            let err = decode(image.slice(..len)).unwrap_err();
            assert_eq!(
                err,
                CodecError::Truncated {
                    len,
                    min: ENVELOPE_HEADER_SIZE
                }
            );
        }
    }

    #[test]
    fn reserved_flags_rejected() {
        let mut image = BytesMut::from(encode(&Envelope::new(1, "")).as_ref());
        image[12] = 0x80;
        let err = decode(image.freeze()).unwrap_err();
        assert_eq!(err, CodecError::InvalidFlags(0x80));
    }

    #[test]
    fn reply_keeps_correlation_id() {
        let request = Envelope::new(10, "ls").with_id(77);
        let reply = request.reply(11, "ok");
        assert_eq!(reply.id, 77);
        assert_eq!(reply.msg_type, 11);
        assert!(!reply.unknown_type);
    }
}
