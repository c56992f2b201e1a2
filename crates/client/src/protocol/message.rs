use bytes::{Buf, Bytes};

/// A response event pulled from the transport.
///
/// A well formed response is one `Header`, any number of `Payload(Chunk)` items and a
/// closing `Payload(Eof)`.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// One item of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    /// end of the response body
    Eof,
}

/// How an outbound body is framed on the wire, as announced in the request head.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` framing
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// no body bytes at all
    Empty,
}

impl PayloadSize {
    /// Framing for a body of known or unknown length.
    pub fn for_length(length: Option<u64>) -> Self {
        match length {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_for_length_hint() {
        assert_eq!(PayloadSize::for_length(Some(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::for_length(Some(42)), PayloadSize::Length(42));
        assert_eq!(PayloadSize::for_length(None), PayloadSize::Chunked);
    }
}
