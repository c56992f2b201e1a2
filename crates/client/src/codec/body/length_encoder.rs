use crate::protocol::{Chunk, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl Encoder<Chunk> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len() as u64;
        if self.eof || len > self.remaining {
            return Err(SendError::invalid_body(format!("body exceeds content-length by {} bytes", len.saturating_sub(self.remaining))));
        }

        dst.extend_from_slice(item.bytes());
        self.remaining -= len;

        if item.is_last() {
            self.eof = true;
            if self.remaining > 0 {
                return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.remaining)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_length_passes_through() {
        let mut encoder = LengthEncoder::new(13);
        let mut dst = BytesMut::new();

        encoder.encode(Chunk::data("Hello, "), &mut dst).unwrap();
        encoder.encode(Chunk::last("world!"), &mut dst).unwrap();

        assert_eq!(&dst[..], b"Hello, world!");
        assert!(encoder.is_finish());
    }

    #[test]
    fn rejects_overflow_and_short_body() {
        let mut dst = BytesMut::new();
        assert!(LengthEncoder::new(2).encode(Chunk::data("abc"), &mut dst).is_err());
        assert!(LengthEncoder::new(4).encode(Chunk::last("abc"), &mut dst).is_err());
    }
}
