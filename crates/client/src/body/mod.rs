//! Outbound request body feeding.
//!
//! A [`BodyFeeder`] produces body chunks on demand; a [`FeedableBodyGenerator`] pulls
//! from it at the pace of the transport's write queue, with a bounded amount of
//! written but unacknowledged bytes. [`BlockingWriter`] is the fallback for callers
//! that push chunks from a thread that may block.
//!
//! Two feeders are provided:
//!
//! - [`StreamFeeder`] reads from any blocking [`std::io::Read`], on a blocking worker
//! - [`ChannelFeeder`] is fed by hand through its [`FeedHandle`]

mod blocking;
mod channel_feeder;
mod feeder;
mod generator;
mod pending;
mod stream_feeder;

pub use blocking::BlockingWriter;
pub use channel_feeder::{ChannelFeeder, FeedHandle, channel_feeder};
pub use feeder::{BodyFeeder, ReadyListener};
pub use generator::{DEFAULT_MAX_PENDING_BYTES, FeedConfig, FeedSummary, FeedableBodyGenerator};
pub use stream_feeder::{DEFAULT_BUFFER_SIZE, StreamFeeder};
