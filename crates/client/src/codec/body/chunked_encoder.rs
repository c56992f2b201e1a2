use crate::protocol::{Chunk, SendError};
use bytes::BytesMut;
use std::io::Write;

use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl Encoder<Chunk> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            warn!("encode chunk after the terminating chunk, ignored");
            return Ok(());
        }

        // a zero sized chunk on the wire terminates the body, so empty data is skipped
        if !item.is_empty() {
            write!(helper::Writer(dst), "{:X}\r\n", item.len())?;
            dst.reserve(item.len() + 2);
            dst.extend_from_slice(item.bytes());
            dst.extend_from_slice(b"\r\n");
        }

        if item.is_last() {
            self.eof = true;
            dst.extend_from_slice(b"0\r\n\r\n");
        }
        Ok(())
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_chunks_and_terminator() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Chunk::data("Hello, "), &mut dst).unwrap();
        encoder.encode(Chunk::data(""), &mut dst).unwrap();
        encoder.encode(Chunk::last("world!"), &mut dst).unwrap();

        assert_eq!(&dst[..], b"7\r\nHello, \r\n6\r\nworld!\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
    }

    #[test]
    fn empty_body_is_only_terminator() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Chunk::eof(), &mut dst).unwrap();
        encoder.encode(Chunk::data("late"), &mut dst).unwrap();

        assert_eq!(&dst[..], b"0\r\n\r\n");
    }
}
