use std::pin::Pin;
use std::task::{Context, Poll};

use crate::pause::{PauseCoordinator, SaveOutcome};

/// Suspension point of a response driver.
///
/// Resolves right away unless the exchange is paused; otherwise it saves the polling
/// task as the continuation and stays pending until [`PauseCoordinator::resume`].
/// Dropping a parked point forgets the continuation but keeps the pause.
///
/// # Panics
///
/// Polling a second point while another one is parked on the same coordinator
/// panics: only one driver may deliver the events of an exchange.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PausePoint<'a> {
    coordinator: &'a PauseCoordinator,
    parked: bool,
}

impl<'a> PausePoint<'a> {
    pub fn new(coordinator: &'a PauseCoordinator) -> Self {
        Self { coordinator, parked: false }
    }
}

impl Future for PausePoint<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.parked {
            if this.coordinator.refresh_continuation(cx.waker()) {
                return Poll::Pending;
            }
            this.parked = false;
            return Poll::Ready(());
        }

        match this.coordinator.try_save_continuation(cx.waker()) {
            Ok(SaveOutcome::Proceed) => Poll::Ready(()),
            Ok(SaveOutcome::Suspend) => {
                this.parked = true;
                Poll::Pending
            }
            Err(e) => panic!("response driver suspension point: {e}"),
        }
    }
}

impl Drop for PausePoint<'_> {
    fn drop(&mut self) {
        if self.parked {
            self.coordinator.abandon_continuation();
        }
    }
}
