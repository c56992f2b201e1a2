use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::protocol::HttpError;

/// Caps the number of exchanges in flight at the same time.
///
/// Waiters are served in arrival order. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct Throttle {
    slots: Arc<Semaphore>,
    max_in_flight: usize,
    max_wait: Option<Duration>,
}

/// A slot of a [`Throttle`], given back when dropped.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

impl Throttle {
    pub fn new(max_in_flight: usize) -> Self {
        Self { slots: Arc::new(Semaphore::new(max_in_flight)), max_in_flight, max_wait: None }
    }

    /// Fails [`acquire`](Self::acquire) with [`HttpError::Throttled`] after waiting this long.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.available()
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<ThrottlePermit, HttpError> {
        let start = Instant::now();
        let acquire = Arc::clone(&self.slots).acquire_owned();

        let acquired = match self.max_wait {
            Some(max_wait) => match tokio::time::timeout(max_wait, acquire).await {
                Ok(acquired) => acquired,
                Err(_elapsed) => {
                    warn!(max_in_flight = self.max_in_flight, "no slot available after waiting {:?}", max_wait);
                    return Err(HttpError::Throttled { waited: max_wait });
                }
            },
            None => acquire.await,
        };

        // the semaphore is never closed while a clone is alive
        let permit = acquired.map_err(|_closed| HttpError::Throttled { waited: start.elapsed() })?;
        debug!(in_flight = self.in_flight(), "throttle slot acquired");
        Ok(ThrottlePermit { _permit: permit })
    }
}
