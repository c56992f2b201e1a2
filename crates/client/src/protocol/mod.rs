//! Core types shared by both directions of an exchange.
//!
//! - [`Chunk`]: one piece of an outbound request body, the last one flagged
//! - [`Message`] / [`PayloadItem`]: inbound response events
//! - [`PayloadSize`]: how an outbound body is framed
//! - [`ResponseHead`]: status line and headers of a response
//! - error types: [`HttpError`] at the top, [`FeedError`] for the outbound body,
//!   [`SendError`] for the transport write path, [`ParseError`] for the inbound
//!   stream and [`PauseError`] for pause/resume misuse

mod chunk;
pub use chunk::Chunk;

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::FeedError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::PauseError;
pub use error::SendError;
