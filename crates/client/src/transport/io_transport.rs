use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::{debug, error, trace};

use crate::codec::PayloadEncoder;
use crate::protocol::{Chunk, PayloadSize, SendError};
use crate::transport::{Transport, WritableCallback, WriteAck};

/// Write queue depth at which an [`IoTransport`] reports saturation by default.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 16;

enum Command {
    Write(Chunk, oneshot::Sender<Result<(), SendError>>),
    End,
}

#[derive(Default)]
struct QueueState {
    depth: usize,
    waiters: Vec<WritableCallback>,
    failed: Option<SendError>,
    ended: bool,
}

struct Shared {
    capacity: usize,
    state: Mutex<QueueState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks one queued write as consumed and wakes writable waiters if room appeared.
    ///
    /// A failed transport never reports room; its waiters were told by [`fail`](Self::fail).
    fn complete_one(&self) {
        let waiters = {
            let mut state = self.state();
            state.depth = state.depth.saturating_sub(1);
            if state.depth < self.capacity && state.failed.is_none() { std::mem::take(&mut state.waiters) } else { Vec::new() }
        };

        for waiter in waiters {
            waiter(Ok(()));
        }
    }

    fn fail(&self, e: &SendError) {
        let waiters = {
            let mut state = self.state();
            state.failed = Some(e.duplicate());
            std::mem::take(&mut state.waiters)
        };

        for waiter in waiters {
            waiter(Err(e.duplicate()));
        }
    }
}

/// A [`Transport`] over a tokio `AsyncWrite`.
///
/// Writes are queued to a [`BodyWriter`] that frames them with a [`PayloadEncoder`]
/// and writes them out in order. The queue itself accepts writes beyond its capacity;
/// capacity is the saturation signal producers are expected to respect.
pub struct IoTransport {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for IoTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("IoTransport")
            .field("capacity", &self.shared.capacity)
            .field("depth", &state.depth)
            .field("ended", &state.ended)
            .finish_non_exhaustive()
    }
}

impl IoTransport {
    /// Creates the transport and the writer future that drains it.
    ///
    /// The caller spawns (or otherwise polls) [`BodyWriter::run`]; nothing is written
    /// until it runs.
    pub fn new<W>(writer: W, payload_size: PayloadSize, capacity: usize) -> (Self, BodyWriter<W>)
    where
        W: AsyncWrite + Unpin,
    {
        let shared = Arc::new(Shared { capacity: capacity.max(1), state: Mutex::new(QueueState::default()) });
        let (sender, receiver) = mpsc::unbounded();

        let transport = Self { shared: Arc::clone(&shared), sender };
        let body_writer = BodyWriter {
            writer,
            receiver,
            shared,
            encoder: PayloadEncoder::from(payload_size),
            buffer: BytesMut::with_capacity(8 * 1024),
        };
        (transport, body_writer)
    }
}

impl Transport for IoTransport {
    fn write(&self, chunk: Chunk) -> WriteAck {
        {
            let mut state = self.shared.state();
            if let Some(e) = &state.failed {
                return futures::future::ready(Err(e.duplicate())).boxed();
            }
            if state.ended {
                return futures::future::ready(Err(SendError::invalid_body("write after end of body"))).boxed();
            }
            state.depth += 1;
        }

        let (tx, rx) = oneshot::channel();
        if self.sender.unbounded_send(Command::Write(chunk, tx)).is_err() {
            self.shared.complete_one();
            return futures::future::ready(Err(SendError::Closed)).boxed();
        }

        rx.map(|result| result.unwrap_or(Err(SendError::Closed))).boxed()
    }

    fn write_queue_depth(&self) -> usize {
        self.shared.state().depth
    }

    fn write_queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    fn notify_writable(&self, callback: WritableCallback) {
        let immediate = {
            let mut state = self.shared.state();
            if let Some(e) = &state.failed {
                Some(Err(e.duplicate()))
            } else if state.depth < self.shared.capacity {
                Some(Ok(()))
            } else {
                state.waiters.push(callback);
                return;
            }
        };

        if let Some(result) = immediate {
            callback(result);
        }
    }

    fn end_body(&self) {
        self.shared.state().ended = true;
        // the writer may already be gone after a failure, which it reported itself
        let _ = self.sender.unbounded_send(Command::End);
    }
}

/// Drains the write queue of an [`IoTransport`] into the underlying writer.
pub struct BodyWriter<W> {
    writer: W,
    receiver: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    encoder: PayloadEncoder,
    buffer: BytesMut,
}

impl<W> std::fmt::Debug for BodyWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyWriter").field("encoder", &self.encoder).finish_non_exhaustive()
    }
}

impl<W> BodyWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Writes queued chunks until the body ends, then hands the writer back.
    ///
    /// A write failure is reported to the failing chunk's acknowledgement, to every
    /// pending writable callback and to the caller; queued writes behind it resolve
    /// as [`SendError::Closed`].
    pub async fn run(mut self) -> Result<W, SendError> {
        while let Some(command) = self.receiver.next().await {
            match command {
                Command::Write(chunk, ack) => {
                    let len = chunk.len();
                    match self.write_chunk(chunk).await {
                        Ok(()) => {
                            self.shared.complete_one();
                            trace!(len, "chunk written");
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            error!(cause = %e, "failed to write request body");
                            self.shared.fail(&e);
                            self.shared.complete_one();
                            let _ = ack.send(Err(e.duplicate()));
                            return Err(e);
                        }
                    }
                }

                Command::End => {
                    if !self.encoder.is_finish() {
                        let e = SendError::invalid_body("body ended without its last chunk");
                        self.shared.fail(&e);
                        return Err(e);
                    }
                    self.writer.flush().await?;
                    debug!("request body written");
                    return Ok(self.writer);
                }
            }
        }

        Err(SendError::Closed)
    }

    async fn write_chunk(&mut self, chunk: Chunk) -> Result<(), SendError> {
        self.buffer.clear();
        self.encoder.encode(chunk, &mut self.buffer)?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_all(&self.buffer).await?;
        Ok(self.writer.flush().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writes_chunked_body_in_order() {
        let (client, mut server) = tokio::io::duplex(64);
        let (transport, writer) = IoTransport::new(client, PayloadSize::Chunked, 4);
        let writing = tokio::spawn(writer.run());

        let first = transport.write(Chunk::data("Hello, "));
        let second = transport.write(Chunk::last("world!"));
        first.await.unwrap();
        second.await.unwrap();
        transport.end_body();

        drop(writing.await.unwrap().unwrap());

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "7\r\nHello, \r\n6\r\nworld!\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn writable_fires_when_depth_drops() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (transport, writer) = IoTransport::new(client, PayloadSize::Length(3), 1);

        let ack = transport.write(Chunk::last("abc"));
        assert!(transport.is_saturated());

        let (tx, rx) = oneshot::channel();
        transport.notify_writable(Box::new(move |result| {
            let _ = tx.send(result.is_ok());
        }));

        let writing = tokio::spawn(writer.run());
        assert!(rx.await.unwrap());
        ack.await.unwrap();
        assert_eq!(transport.write_queue_depth(), 0);

        transport.end_body();
        drop(writing.await.unwrap().unwrap());

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abc");
    }

    #[tokio::test]
    async fn encoding_failure_fails_pending_waiters_and_later_writes() {
        let (client, _server) = tokio::io::duplex(1024);
        let (transport, writer) = IoTransport::new(client, PayloadSize::Length(2), 1);

        let ack = transport.write(Chunk::last("too long"));
        let (tx, rx) = oneshot::channel();
        transport.notify_writable(Box::new(move |result| {
            let _ = tx.send(result.is_err());
        }));

        assert!(writer.run().await.is_err());
        assert!(ack.await.is_err());
        assert!(rx.await.unwrap());
        assert!(transport.write(Chunk::eof()).await.is_err());
    }

    #[tokio::test]
    async fn saturated_waiter_hears_of_write_failure() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let (transport, writer) = IoTransport::new(client, PayloadSize::Chunked, 1);

        let ack = transport.write(Chunk::data("lost"));
        assert!(transport.is_saturated());
        let (tx, rx) = oneshot::channel();
        transport.notify_writable(Box::new(move |result| {
            let _ = tx.send(result);
        }));

        assert!(writer.run().await.is_err());
        assert!(ack.await.is_err());
        assert!(rx.await.unwrap().is_err());
    }
}
