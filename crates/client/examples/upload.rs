//! Uploads a body to a local listener with a small pending-bytes ceiling, then
//! delivers a response to a handler that pauses after every chunk.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use http::StatusCode;
use micro_http_client::body::{FeedConfig, FeedableBodyGenerator, StreamFeeder};
use micro_http_client::connection::HttpExchange;
use micro_http_client::handler::{Action, ResponseHandler};
use micro_http_client::pause::PauseHandle;
use micro_http_client::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use micro_http_client::transport::IoTransport;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Pretends every chunk takes a while to process, resuming from another task.
struct SlowConsumer {
    received: usize,
}

impl ResponseHandler for SlowConsumer {
    type Output = usize;

    fn on_head(&mut self, head: ResponseHead, _pause: &PauseHandle) -> Action {
        info!(status = %head.status(), "response head");
        Action::Continue
    }

    fn on_chunk(&mut self, chunk: Bytes, pause: &PauseHandle) -> Action {
        self.received += chunk.len();
        pause.request_pause();

        let pause = pause.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            info!("caught up, resuming");
            pause.resume();
        });
        Action::Continue
    }

    fn on_completed(&mut self) -> usize {
        self.received
    }

    fn on_error(&mut self, error: &HttpError) {
        error!("exchange failed, cause {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let (mut socket, _remote_addr) = listener.accept().await?;
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await?;
        Ok::<_, std::io::Error>(received.len())
    });

    let socket = TcpStream::connect(address).await?;
    let (transport, writer) = IoTransport::new(socket, PayloadSize::Chunked, 4);
    let writing = tokio::spawn(writer.run());

    let mut head = ResponseHead::new(());
    *head.status_mut() = StatusCode::OK;
    let events = stream::iter(vec![
        Ok::<_, ParseError>(Message::Header(head)),
        Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"first")))),
        Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"second")))),
        Ok(Message::Payload(PayloadItem::Eof)),
    ]);

    let body = Cursor::new(vec![b'x'; 256 * 1024]);
    let config = FeedConfig::new().with_max_pending_bytes(16 * 1024).with_write_timeout(Duration::from_secs(5));
    let mut generator = FeedableBodyGenerator::with_config(StreamFeeder::seekable(body)?, config);

    let exchange = HttpExchange::new(transport, events);
    info!(id = %exchange.id(), "start exchange");
    let received = exchange.execute(&mut generator, &mut SlowConsumer { received: 0 }).await?;
    info!(received, "response consumed");

    if !generator.is_finished() {
        warn!("request body was not fully sent");
        return Ok(());
    }

    // the body is fully sent once the writer handed the socket back
    drop(writing.await??);
    let uploaded = server.await??;
    info!(uploaded, "server received the chunked body");
    Ok(())
}
