use std::sync::Arc;

use crate::exchange::{ExchangeContext, ExchangeId};
use crate::protocol::PauseError;

/// Handed to a response handler with every event so it can stop the delivery of
/// further events until it catches up.
///
/// The handle may be cloned and moved to any thread; resuming from another task is
/// the expected use. A paused exchange stays paused until [`resume`](Self::resume)
/// is called, there is no timeout.
#[derive(Debug, Clone)]
pub struct PauseHandle {
    exchange: Arc<ExchangeContext>,
}

impl PauseHandle {
    pub fn new(exchange: Arc<ExchangeContext>) -> Self {
        Self { exchange }
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.exchange.id()
    }

    /// Stops event delivery after the event currently being handled.
    ///
    /// # Panics
    ///
    /// Panics if the exchange is already paused.
    pub fn request_pause(&self) {
        if let Err(e) = self.try_request_pause() {
            panic!("exchange {}: {e}", self.exchange.id());
        }
    }

    /// Resumes event delivery; a no-op wake if the driver did not park yet.
    ///
    /// # Panics
    ///
    /// Panics if the exchange is not paused.
    pub fn resume(&self) {
        if let Err(e) = self.try_resume() {
            panic!("exchange {}: {e}", self.exchange.id());
        }
    }

    pub fn try_request_pause(&self) -> Result<(), PauseError> {
        self.exchange.pause().request_pause()
    }

    pub fn try_resume(&self) -> Result<(), PauseError> {
        self.exchange.pause().resume()
    }

    pub fn is_paused(&self) -> bool {
        self.exchange.pause().is_paused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> PauseHandle {
        PauseHandle::new(Arc::new(ExchangeContext::new()))
    }

    #[test]
    #[should_panic(expected = "already paused")]
    fn double_pause_panics() {
        let handle = handle();
        handle.request_pause();
        handle.request_pause();
    }

    #[test]
    #[should_panic(expected = "non-paused")]
    fn resume_on_idle_panics() {
        handle().resume();
    }

    #[test]
    fn try_variants_report_misuse() {
        let handle = handle();
        assert_eq!(handle.try_resume(), Err(PauseError::NotPaused));

        handle.try_request_pause().unwrap();
        assert!(handle.is_paused());
        assert_eq!(handle.try_request_pause(), Err(PauseError::AlreadyPaused));

        handle.try_resume().unwrap();
        assert!(!handle.is_paused());
    }

    #[test]
    fn clones_share_the_exchange() {
        let handle = handle();
        let other = handle.clone();

        handle.request_pause();
        assert!(other.is_paused());
        assert_eq!(handle.exchange_id(), other.exchange_id());
        other.resume();
        assert!(!handle.is_paused());
    }
}
