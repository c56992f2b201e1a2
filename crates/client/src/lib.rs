//! Flow control core of an asynchronous micro HTTP client
//!
//! This crate reconciles three differently paced actors of an HTTP exchange: a body
//! source that may block, a transport write path with a bounded write queue, and a
//! response consumer that may fall behind the data it receives. It is built on top of
//! tokio and leaves header framing, TLS and connection management to the network
//! engine it is plugged into.
//!
//! # Features
//!
//! - Request bodies streamed chunk by chunk, never blocking the event loop
//! - Bounded buffering: a byte ceiling on written but unacknowledged data
//! - Write-queue backpressure through one-shot writable notifications
//! - Blocking fallback with timeout and cancellation for plain threads
//! - Pause and resume of response delivery from any thread
//! - Retries refused for bodies that can not be replayed
//! - Throttling of concurrently running exchanges
//!
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use futures::stream;
//! use http::StatusCode;
//! use micro_http_client::body::{FeedableBodyGenerator, StreamFeeder};
//! use micro_http_client::connection::HttpExchange;
//! use micro_http_client::handler::{Action, ResponseHandler};
//! use micro_http_client::pause::PauseHandle;
//! use micro_http_client::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
//! use micro_http_client::transport::IoTransport;
//! use tokio::net::TcpStream;
//! use tracing::{error, info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! struct Printer;
//!
//! impl ResponseHandler for Printer {
//!     type Output = ();
//!
//!     fn on_head(&mut self, head: ResponseHead, _pause: &PauseHandle) -> Action {
//!         info!(status = %head.status(), "response head");
//!         Action::Continue
//!     }
//!
//!     fn on_chunk(&mut self, chunk: Bytes, _pause: &PauseHandle) -> Action {
//!         info!(size = chunk.len(), "response chunk");
//!         Action::Continue
//!     }
//!
//!     fn on_completed(&mut self) {}
//!
//!     fn on_error(&mut self, error: &HttpError) {
//!         error!("exchange failed, cause {}", error);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     // the request head has already been written by the network engine
//!     let socket = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (transport, writer) = IoTransport::new(socket, PayloadSize::Chunked, 16);
//!     tokio::spawn(writer.run());
//!
//!     let mut head = ResponseHead::new(());
//!     *head.status_mut() = StatusCode::OK;
//!     let events = stream::iter(vec![Ok::<_, ParseError>(Message::Header(head)), Ok(Message::Payload(PayloadItem::Eof))]);
//!
//!     let file = std::fs::File::open("upload.bin")?;
//!     let mut generator = FeedableBodyGenerator::new(StreamFeeder::seekable(file)?);
//!     HttpExchange::new(transport, events).execute(&mut generator, &mut Printer).await?;
//!     Ok(())
//! }
//! ```
//!
//!
//! # Architecture
//!
//! - [`body`]: body feeders and the generator that rate-matches them to the transport
//! - [`pause`]: pause/resume coordination of response event delivery
//! - [`connection`]: the response driver and the exchange runner
//! - [`transport`]: the write path boundary and a tokio `AsyncWrite` implementation
//! - [`codec`]: wire framing of request bodies
//! - [`protocol`]: chunks, response events and error types
//! - [`throttle`]: a cap on concurrently running exchanges
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: top-level error of an exchange
//! - [`protocol::FeedError`]: request body failures
//! - [`protocol::SendError`]: transport write failures
//! - [`protocol::ParseError`]: response stream failures
//! - [`protocol::PauseError`]: pause/resume misuse, which the convenience methods turn into panics
//!
//! # Limitations
//!
//! - No HTTP parser: response events come from the network engine
//! - A paused exchange stays paused until resumed; there is no pause timeout

pub mod body;
pub mod codec;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod pause;
pub mod protocol;
pub mod throttle;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
