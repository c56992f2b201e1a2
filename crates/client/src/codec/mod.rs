//! Wire framing of outbound request bodies.
//!
//! Header framing belongs to the network engine; this module only turns a sequence of
//! [`Chunk`](crate::protocol::Chunk)s into body bytes:
//!
//! - [`PayloadEncoder`]: picks the strategy from a [`PayloadSize`](crate::protocol::PayloadSize)
//! - chunked transfer coding (RFC 7230 section 4.1)
//! - `Content-Length` framing that refuses bodies longer or shorter than announced

mod body;

pub use body::PayloadEncoder;
