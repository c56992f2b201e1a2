//! The transport write path as seen by the body generator.
//!
//! The network engine is an external collaborator; this module only fixes the
//! boundary the flow-control layer talks to:
//!
//! - [`Transport`]: asynchronous writes with a bounded write queue and a one-shot
//!   "writable again" notification
//! - [`wait_writable`] / [`block_until_writable`]: waiting for queue capacity, either
//!   on the event loop or from a blocking worker thread
//! - [`IoTransport`]: a concrete transport over any tokio `AsyncWrite`, framing body
//!   chunks with content-length or chunked transfer coding

mod io_transport;
mod writable;

pub use io_transport::{BodyWriter, DEFAULT_WRITE_QUEUE_CAPACITY, IoTransport};
pub use writable::{block_until_writable, wait_writable};
pub(crate) use writable::with_deadline;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::protocol::{Chunk, SendError};

/// Completes once the transport has consumed a written chunk.
pub type WriteAck = BoxFuture<'static, Result<(), SendError>>;

/// One-shot notification that the write queue has room again, or that it never will.
pub type WritableCallback = Box<dyn FnOnce(Result<(), SendError>) + Send + 'static>;

/// Asynchronous, non-blocking write path of a connection.
///
/// Implementations must be callable from any thread. Writes are consumed in the order
/// they were issued.
pub trait Transport: Send + Sync {
    /// Queues a chunk for writing. Never blocks; the returned future resolves when the
    /// chunk has been consumed or the write failed.
    fn write(&self, chunk: Chunk) -> WriteAck;

    /// Number of writes queued but not yet consumed.
    fn write_queue_depth(&self) -> usize;

    /// Queue depth at which the transport considers itself saturated.
    fn write_queue_capacity(&self) -> usize;

    /// Registers a one-shot callback fired when the queue depth drops below capacity.
    ///
    /// If the queue already has room at registration time the callback is invoked
    /// immediately, so a notification can never be lost between a depth check and the
    /// registration. A failed transport invokes it with the failure.
    fn notify_writable(&self, callback: WritableCallback);

    /// Signals that the last chunk of the body has been written and acknowledged.
    fn end_body(&self) {}

    #[inline]
    fn is_saturated(&self) -> bool {
        self.write_queue_depth() >= self.write_queue_capacity()
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn write(&self, chunk: Chunk) -> WriteAck {
        (**self).write(chunk)
    }

    fn write_queue_depth(&self) -> usize {
        (**self).write_queue_depth()
    }

    fn write_queue_capacity(&self) -> usize {
        (**self).write_queue_capacity()
    }

    fn notify_writable(&self, callback: WritableCallback) {
        (**self).notify_writable(callback);
    }

    fn end_body(&self) {
        (**self).end_body();
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn write(&self, chunk: Chunk) -> WriteAck {
        (**self).write(chunk)
    }

    fn write_queue_depth(&self) -> usize {
        (**self).write_queue_depth()
    }

    fn write_queue_capacity(&self) -> usize {
        (**self).write_queue_capacity()
    }

    fn notify_writable(&self, callback: WritableCallback) {
        (**self).notify_writable(callback);
    }

    fn end_body(&self) {
        (**self).end_body();
    }
}
