use crate::protocol::{Chunk, FeedError};

/// Invoked once when a feeder that was not ready can produce again.
pub type ReadyListener = Box<dyn FnOnce() + Send + 'static>;

/// A producer of request body chunks, pulled by a
/// [`FeedableBodyGenerator`](super::FeedableBodyGenerator).
///
/// The generator polls readiness explicitly and only calls [`can_feed`](Self::can_feed)
/// on a ready feeder. A feeder that may block is driven from a blocking worker thread,
/// never from the event loop.
///
/// A feed cycle ends with exactly one chunk flagged last (possibly empty); after it
/// the feeder reports done and is never ready again until [`reset`](Self::reset).
pub trait BodyFeeder: Send {
    /// Produces the next chunk.
    ///
    /// A transient zero byte read produces an empty chunk that is not last. A read
    /// failure is returned as [`FeedError::Source`] and aborts the transfer.
    fn can_feed(&mut self) -> Result<Chunk, FeedError>;

    /// Another chunk can be attempted right now. Always false once done.
    fn is_ready(&self) -> bool;

    /// The last chunk has been produced.
    fn is_done(&self) -> bool;

    /// Invokes `listener` right away if ready, otherwise exactly once when readiness changes.
    fn notify_ready_to_feed(&mut self, listener: ReadyListener);

    /// Rewinds to the start of the body so the same body can be sent again.
    ///
    /// Returns [`FeedError::RewindUnsupported`] when the source can not be rewound: a
    /// retry would otherwise send a truncated or empty body.
    fn reset(&mut self) -> Result<(), FeedError>;

    /// Whether [`can_feed`](Self::can_feed) may block the calling thread.
    fn may_block(&self) -> bool {
        true
    }
}

impl<F: BodyFeeder + ?Sized> BodyFeeder for Box<F> {
    fn can_feed(&mut self) -> Result<Chunk, FeedError> {
        (**self).can_feed()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn notify_ready_to_feed(&mut self, listener: ReadyListener) {
        (**self).notify_ready_to_feed(listener);
    }

    fn reset(&mut self) -> Result<(), FeedError> {
        (**self).reset()
    }

    fn may_block(&self) -> bool {
        (**self).may_block()
    }
}
