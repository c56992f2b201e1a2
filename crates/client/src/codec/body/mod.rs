//! Encoders for request payloads.
//!
//! - [`ChunkedEncoder`]: chunked transfer encoding
//! - [`LengthEncoder`]: fixed-length payloads
//! - [`PayloadEncoder`]: dispatches to one of the above, or writes nothing for an empty body

mod chunked_encoder;
mod length_encoder;
mod payload_encoder;

pub use payload_encoder::PayloadEncoder;
