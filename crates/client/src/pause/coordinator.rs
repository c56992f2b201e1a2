use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

use tracing::trace;

use crate::protocol::PauseError;

/// Pause state of one exchange.
#[derive(Debug, Default)]
pub enum PauseState {
    /// no pause requested
    #[default]
    Idle,
    /// a pause was requested before the driver reached its suspension point
    PausedNoAction,
    /// the driver is parked while paused; the waker resumes it
    PausedWithAction(Waker),
}

/// What the driver does at its suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// paused: the continuation was saved, stop delivering events until resumed
    Suspend,
    /// not paused: go on delivering events
    Proceed,
}

/// Serializes the pause protocol of one exchange.
///
/// Every transition happens under one mutex that is only held for the transition
/// itself; a saved continuation is woken after the lock has been released.
#[derive(Debug, Default)]
pub struct PauseCoordinator {
    state: Mutex<PauseState>,
}

impl PauseCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PauseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the exchange paused; event delivery stops at the next suspension point.
    pub fn request_pause(&self) -> Result<(), PauseError> {
        let mut state = self.state();
        match *state {
            PauseState::Idle => {
                *state = PauseState::PausedNoAction;
                trace!("pause requested");
                Ok(())
            }
            PauseState::PausedNoAction | PauseState::PausedWithAction(_) => Err(PauseError::AlreadyPaused),
        }
    }

    /// Called by the driver at its suspension point.
    ///
    /// When paused, saves `waker` as the continuation and answers
    /// [`SaveOutcome::Suspend`]. When idle, possibly because the exchange was resumed
    /// before the driver got here, answers [`SaveOutcome::Proceed`].
    pub fn try_save_continuation(&self, waker: &Waker) -> Result<SaveOutcome, PauseError> {
        let mut state = self.state();
        match *state {
            PauseState::Idle => Ok(SaveOutcome::Proceed),
            PauseState::PausedNoAction => {
                *state = PauseState::PausedWithAction(waker.clone());
                trace!("event delivery suspended");
                Ok(SaveOutcome::Suspend)
            }
            PauseState::PausedWithAction(_) => Err(PauseError::ContinuationOverride),
        }
    }

    /// Clears the pause and wakes the saved continuation, if the driver already parked.
    pub fn resume(&self) -> Result<(), PauseError> {
        let continuation = {
            let mut state = self.state();
            match std::mem::take(&mut *state) {
                PauseState::Idle => return Err(PauseError::NotPaused),
                PauseState::PausedNoAction => None,
                PauseState::PausedWithAction(waker) => Some(waker),
            }
        };

        match continuation {
            Some(waker) => {
                trace!("resuming suspended event delivery");
                waker.wake();
            }
            None => trace!("resumed before event delivery was suspended"),
        }
        Ok(())
    }

    /// Keeps the continuation of a parked driver up to date when it is polled again.
    ///
    /// Returns whether the driver is still parked. A resume that already happened,
    /// even one followed by a new pause request, releases it.
    pub(crate) fn refresh_continuation(&self, waker: &Waker) -> bool {
        let mut state = self.state();
        match &mut *state {
            PauseState::PausedWithAction(saved) => {
                if !saved.will_wake(waker) {
                    saved.clone_from(waker);
                }
                true
            }
            PauseState::Idle | PauseState::PausedNoAction => false,
        }
    }

    /// Forgets the continuation of a driver that stopped waiting; the pause itself stays.
    pub(crate) fn abandon_continuation(&self) {
        let mut state = self.state();
        if matches!(*state, PauseState::PausedWithAction(_)) {
            *state = PauseState::PausedNoAction;
        }
    }

    pub fn is_paused(&self) -> bool {
        !matches!(*self.state(), PauseState::Idle)
    }

    /// Whether a driver is currently parked on this coordinator.
    pub fn is_suspended(&self) -> bool {
        matches!(*self.state(), PauseState::PausedWithAction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::{ArcWake, noop_waker_ref, waker};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn pause_then_suspend_then_resume_wakes_once() {
        let coordinator = PauseCoordinator::new();
        let wakes = Arc::new(CountingWaker::default());
        let continuation = waker(Arc::clone(&wakes));

        coordinator.request_pause().unwrap();
        assert_eq!(coordinator.try_save_continuation(&continuation), Ok(SaveOutcome::Suspend));
        assert!(coordinator.is_suspended());

        coordinator.resume().unwrap();
        assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_paused());
        assert_eq!(coordinator.try_save_continuation(&continuation), Ok(SaveOutcome::Proceed));
    }

    #[test]
    fn resume_before_suspension_point_does_not_suspend() {
        let coordinator = PauseCoordinator::new();

        coordinator.request_pause().unwrap();
        coordinator.resume().unwrap();

        assert_eq!(coordinator.try_save_continuation(noop_waker_ref()), Ok(SaveOutcome::Proceed));
        assert!(!coordinator.is_paused());
    }

    #[test]
    fn double_pause_is_rejected() {
        let coordinator = PauseCoordinator::new();
        coordinator.request_pause().unwrap();
        assert_eq!(coordinator.request_pause(), Err(PauseError::AlreadyPaused));

        coordinator.try_save_continuation(noop_waker_ref()).unwrap();
        assert_eq!(coordinator.request_pause(), Err(PauseError::AlreadyPaused));
    }

    #[test]
    fn resume_without_pause_is_rejected() {
        let coordinator = PauseCoordinator::new();
        assert_eq!(coordinator.resume(), Err(PauseError::NotPaused));

        coordinator.request_pause().unwrap();
        coordinator.resume().unwrap();
        assert_eq!(coordinator.resume(), Err(PauseError::NotPaused));
    }

    #[test]
    fn saved_continuation_is_never_overridden() {
        let coordinator = PauseCoordinator::new();
        coordinator.request_pause().unwrap();
        coordinator.try_save_continuation(noop_waker_ref()).unwrap();

        assert_eq!(coordinator.try_save_continuation(noop_waker_ref()), Err(PauseError::ContinuationOverride));
    }

    #[test]
    fn refreshed_continuation_is_the_one_woken() {
        let coordinator = PauseCoordinator::new();
        let first = Arc::new(CountingWaker::default());
        let second = Arc::new(CountingWaker::default());

        coordinator.request_pause().unwrap();
        coordinator.try_save_continuation(&waker(Arc::clone(&first))).unwrap();
        assert!(coordinator.refresh_continuation(&waker(Arc::clone(&second))));

        coordinator.resume().unwrap();
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert!(!coordinator.refresh_continuation(noop_waker_ref()));
    }

    #[test]
    fn abandoned_continuation_keeps_the_pause() {
        let coordinator = PauseCoordinator::new();
        coordinator.request_pause().unwrap();
        coordinator.try_save_continuation(noop_waker_ref()).unwrap();

        coordinator.abandon_continuation();

        assert!(coordinator.is_paused());
        assert!(!coordinator.is_suspended());
        assert_eq!(coordinator.try_save_continuation(noop_waker_ref()), Ok(SaveOutcome::Suspend));
    }
}
