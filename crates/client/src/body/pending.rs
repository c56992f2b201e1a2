use std::collections::VecDeque;

use futures::FutureExt;

use crate::protocol::SendError;
use crate::transport::WriteAck;

struct PendingWrite {
    len: usize,
    ack: WriteAck,
}

/// Chunks handed to the transport but not yet consumed by it, bounded by a byte ceiling.
pub(crate) struct PendingQueue {
    writes: VecDeque<PendingWrite>,
    bytes: usize,
    max_bytes: usize,
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("writes", &self.writes.len())
            .field("bytes", &self.bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl PendingQueue {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self { writes: VecDeque::new(), bytes: 0, max_bytes }
    }

    #[inline]
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    /// Bytes that can still be admitted without crossing the ceiling.
    #[inline]
    pub(crate) fn room(&self) -> usize {
        self.max_bytes.saturating_sub(self.bytes)
    }

    pub(crate) fn push(&mut self, len: usize, ack: WriteAck) {
        debug_assert!(len <= self.room(), "pending writes would exceed the ceiling");
        self.bytes += len;
        self.writes.push_back(PendingWrite { len, ack });
    }

    /// Drops already acknowledged writes from the front of the queue without waiting.
    pub(crate) fn reap(&mut self) -> Result<(), SendError> {
        while let Some(front) = self.writes.front_mut() {
            match (&mut front.ack).now_or_never() {
                Some(result) => {
                    self.pop_front();
                    result?;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Waits for the oldest write to be acknowledged.
    pub(crate) async fn wait_front(&mut self) -> Result<(), SendError> {
        let Some(front) = self.writes.front_mut() else {
            return Ok(());
        };

        let result = (&mut front.ack).await;
        self.pop_front();
        result
    }

    /// Waits until every pending write is acknowledged.
    pub(crate) async fn drain(&mut self) -> Result<(), SendError> {
        while !self.writes.is_empty() {
            self.wait_front().await?;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.writes.clear();
        self.bytes = 0;
    }

    fn pop_front(&mut self) {
        if let Some(write) = self.writes.pop_front() {
            self.bytes -= write.len;
        }
    }
}
