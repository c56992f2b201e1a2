use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{Chunk, PayloadSize, SendError};

/// Frames the chunks of one request body for the wire.
///
/// The framing follows the [`PayloadSize`] announced in the request head: raw bytes
/// checked against `Content-Length`, chunked transfer coding, or no body at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    framing: Framing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Framing {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// only an empty last chunk is accepted
    Empty { ended: bool },
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { framing: Framing::Empty { ended: false } }
    }

    pub fn chunked() -> Self {
        Self { framing: Framing::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { framing: Framing::Length(LengthEncoder::new(size)) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.framing, Framing::Chunked(_))
    }

    /// The last chunk has been encoded.
    pub fn is_finish(&self) -> bool {
        match &self.framing {
            Framing::Length(encoder) => encoder.is_finish(),
            Framing::Chunked(encoder) => encoder.is_finish(),
            Framing::Empty { ended } => *ended,
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(0) | PayloadSize::Empty => PayloadEncoder::empty(),
            PayloadSize::Length(size) => PayloadEncoder::fix_length(size),
            PayloadSize::Chunked => PayloadEncoder::chunked(),
        }
    }
}

impl Encoder<Chunk> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.framing {
            Framing::Length(encoder) => encoder.encode(item, dst),
            Framing::Chunked(encoder) => encoder.encode(item, dst),
            Framing::Empty { .. } if !item.is_empty() => Err(SendError::invalid_body("body bytes written for a request without body")),
            Framing::Empty { ended } => {
                *ended |= item.is_last();
                Ok(())
            }
        }
    }
}
