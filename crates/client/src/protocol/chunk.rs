use bytes::Bytes;

/// An immutable piece of an outbound request body.
///
/// The chunk flagged `last` is the unique end-of-stream marker of a body: it may be
/// empty, and no chunk ever follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    last: bool,
}

impl Chunk {
    /// Creates a chunk that is not the end of the body.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), last: false }
    }

    /// Creates the final chunk of a body.
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), last: true }
    }

    /// Creates an empty final chunk.
    pub fn eof() -> Self {
        Self { data: Bytes::new(), last: true }
    }

    pub fn new(data: Bytes, last: bool) -> Self {
        Self { data, last }
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.last
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Splits off the first `at` bytes as a non-last chunk, leaving the rest in `self`.
    ///
    /// `self` keeps its `last` flag. Zero-copy, see [`Bytes::split_to`].
    ///
    /// # Panics
    ///
    /// Panics if `at > self.len()`.
    pub fn split_to(&mut self, at: usize) -> Chunk {
        Chunk { data: self.data.split_to(at), last: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_last_flag_on_remainder() {
        let mut chunk = Chunk::last(Bytes::from_static(b"Hello, world!"));
        let head = chunk.split_to(5);

        assert_eq!(head.bytes().as_ref(), b"Hello");
        assert!(!head.is_last());
        assert_eq!(chunk.bytes().as_ref(), b", world!");
        assert!(chunk.is_last());
    }

    #[test]
    fn eof_is_empty_and_last() {
        let chunk = Chunk::eof();
        assert!(chunk.is_empty());
        assert!(chunk.is_last());
    }
}
