//! `tokio_util::codec` adapter for the envelope wire format.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, truncation, DEFAULT_MAX_FRAME, LENGTH_PREFIX_SIZE};
use crate::envelope::{self, Envelope};
use crate::error::FrameError;

/// Envelope codec for `FramedRead` / `FramedWrite`.
///
/// Applies the same rules as the blocking reader and writer: oversized
/// prefixes are rejected before buffering, and leftover bytes at end of
/// stream are a truncation error.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame_size: usize,
}

impl EnvelopeCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src, self.max_frame_size)? {
            Some(payload) => Ok(Some(envelope::decode(payload)?)),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(envelope) = self.decode(buf)? {
            return Ok(Some(envelope));
        }
        match truncation(buf) {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.encoded_len();
        let max = self.max_frame_size.min(u32::MAX as usize);
        if size > max {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + size);
        dst.put_u32_le(size as u32);
        envelope::encode_into(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        // A tiny duplex buffer forces the codec to reassemble partial frames.
        let (client, server) = tokio::io::duplex(7);
        let mut sink = FramedWrite::new(client, EnvelopeCodec::default());
        let mut stream = FramedRead::new(server, EnvelopeCodec::default());

        let sent: Vec<Envelope> = (0..4u64)
            .map(|i| Envelope::new(1, vec![i as u8; 100 * i as usize]).with_id(i))
            .collect();
        let expected = sent.clone();

        let writer = tokio::spawn(async move {
            for envelope in sent {
                sink.send(envelope).await.unwrap();
            }
        });

        for expected in expected {
            let got = stream.next().await.unwrap().unwrap();
            assert_eq!(got, expected);
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncation() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, EnvelopeCodec::default());

        client.write_all(&[20, 0, 0, 0, 1, 2, 3]).await.unwrap();
        drop(client);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 20,
                received: 3
            }
        ));
    }

    #[test]
    fn encoder_rejects_oversized_envelope() {
        let mut codec = EnvelopeCodec::new(8);
        let mut dst = BytesMut::new();
        let err = codec.encode(Envelope::new(1, ""), &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 13, max: 8 }));
        assert!(dst.is_empty());
    }

    #[test]
    fn decoder_rejects_oversized_prefix() {
        let mut codec = EnvelopeCodec::new(32);
        let mut src = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0x7F][..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: 32, .. }));
    }
}
