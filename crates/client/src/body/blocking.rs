use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::channel::oneshot;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::body::BodyFeeder;
use crate::ensure;
use crate::protocol::{Chunk, FeedError};
use crate::transport::{Transport, WriteAck, block_until_writable, with_deadline};

/// Pushes body chunks to a transport from a thread that is allowed to block.
///
/// Every write first waits for room in the write queue with
/// [`block_until_writable`]; the wait is bounded by the configured timeout and the
/// writer's cancellation token. The last chunk blocks until every write has been
/// acknowledged and then ends the body. Nothing can be written afterwards.
///
/// Must not be used from inside an async task, see [`Handle::block_on`].
pub struct BlockingWriter<T> {
    transport: T,
    handle: Handle,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    acks: VecDeque<WriteAck>,
    bytes: u64,
    finished: bool,
}

impl<T> std::fmt::Debug for BlockingWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingWriter")
            .field("timeout", &self.timeout)
            .field("unacknowledged", &self.acks.len())
            .field("bytes", &self.bytes)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> BlockingWriter<T> {
    pub fn new(transport: T, handle: Handle) -> Self {
        Self {
            transport,
            handle,
            timeout: None,
            cancel: CancellationToken::new(),
            acks: VecDeque::new(),
            bytes: 0,
            finished: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bytes written so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Writes one chunk, blocking while the write queue is saturated.
    pub fn feed(&mut self, data: impl Into<Bytes>, last: bool) -> Result<(), FeedError> {
        self.write(Chunk::new(data.into(), last))
    }

    /// Sends everything `feeder` produces, blocking on both the feeder and the transport.
    ///
    /// Returns the number of body bytes sent.
    pub fn send_feeder<F>(&mut self, feeder: &mut F) -> Result<u64, FeedError>
    where
        F: BodyFeeder + ?Sized,
    {
        ensure!(!self.finished, FeedError::Finished);
        let start = self.bytes;

        while !self.finished {
            if !feeder.is_ready() {
                ensure!(!feeder.is_done(), FeedError::invalid_state("feeder done without a last chunk"));
                self.wait_ready(feeder)?;
                continue;
            }
            let chunk = feeder.can_feed()?;
            self.write(chunk)?;
        }

        Ok(self.bytes - start)
    }

    fn write(&mut self, chunk: Chunk) -> Result<(), FeedError> {
        ensure!(!self.finished, FeedError::Finished);
        self.reap()?;

        if chunk.is_empty() && !chunk.is_last() {
            return Ok(());
        }

        block_until_writable(&self.handle, &self.transport, self.timeout, &self.cancel)?;

        let last = chunk.is_last();
        self.bytes += chunk.len() as u64;
        trace!(len = chunk.len(), last, "blocking write");
        self.acks.push_back(self.transport.write(chunk));

        if last {
            self.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FeedError> {
        let acks = std::mem::take(&mut self.acks);
        let acknowledged = async move {
            for ack in acks {
                ack.await?;
            }
            Ok::<(), FeedError>(())
        };
        self.handle.block_on(with_deadline(acknowledged, self.timeout, &self.cancel))?;

        self.transport.end_body();
        self.finished = true;
        debug!(bytes = self.bytes, "request body written");
        Ok(())
    }

    fn reap(&mut self) -> Result<(), FeedError> {
        while let Some(front) = self.acks.front_mut() {
            let Some(result) = front.now_or_never() else {
                break;
            };
            self.acks.pop_front();
            result?;
        }
        Ok(())
    }

    fn wait_ready<F>(&self, feeder: &mut F) -> Result<(), FeedError>
    where
        F: BodyFeeder + ?Sized,
    {
        let (tx, rx) = oneshot::channel();
        feeder.notify_ready_to_feed(Box::new(move || {
            let _ = tx.send(());
        }));

        let ready = async move { rx.await.map_err(|_canceled| FeedError::invalid_state("feeder dropped its ready listener")) };
        self.handle.block_on(with_deadline(ready, self.timeout, &self.cancel))
    }
}
