use bytes::Bytes;

use crate::pause::PauseHandle;
use crate::protocol::{HttpError, ResponseHead};

/// What the driver does after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// stop the exchange, it fails with [`HttpError::Aborted`]
    Abort,
}

/// Consumer of the response events of one exchange.
///
/// Callbacks run on the driver task, one at a time and in arrival order. Every event
/// comes with the exchange's [`PauseHandle`]: a handler that needs time to process
/// what it received pauses, and resumes later from wherever it likes.
pub trait ResponseHandler {
    type Output;

    fn on_head(&mut self, head: ResponseHead, pause: &PauseHandle) -> Action;

    fn on_chunk(&mut self, chunk: Bytes, pause: &PauseHandle) -> Action;

    /// The whole response has been delivered.
    fn on_completed(&mut self) -> Self::Output;

    /// The exchange failed. Not called while the exchange is paused.
    fn on_error(&mut self, error: &HttpError);
}

impl<H: ResponseHandler + ?Sized> ResponseHandler for &mut H {
    type Output = H::Output;

    fn on_head(&mut self, head: ResponseHead, pause: &PauseHandle) -> Action {
        (**self).on_head(head, pause)
    }

    fn on_chunk(&mut self, chunk: Bytes, pause: &PauseHandle) -> Action {
        (**self).on_chunk(chunk, pause)
    }

    fn on_completed(&mut self) -> Self::Output {
        (**self).on_completed()
    }

    fn on_error(&mut self, error: &HttpError) {
        (**self).on_error(error);
    }
}
