use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

use crate::body::{BodyFeeder, ReadyListener};
use crate::ensure;
use crate::protocol::{Chunk, FeedError};

/// Creates a manually fed body: the [`ChannelFeeder`] goes to the generator, the
/// [`FeedHandle`] to whoever produces the body.
///
/// At most `max_backlog_bytes` produced but not yet pulled bytes are held; a producer
/// feeding beyond that blocks until the generator catches up. A single chunk larger
/// than the limit is accepted once the backlog is empty.
pub fn channel_feeder(max_backlog_bytes: usize) -> (ChannelFeeder, FeedHandle) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            backlog: VecDeque::new(),
            backlog_bytes: 0,
            max_backlog_bytes,
            listener: None,
            last_fed: false,
            done: false,
            handles: 1,
            feeder_gone: false,
        }),
        drained: Condvar::new(),
    });

    (ChannelFeeder { shared: Arc::clone(&shared) }, FeedHandle { shared })
}

struct ChannelState {
    backlog: VecDeque<Chunk>,
    backlog_bytes: usize,
    max_backlog_bytes: usize,
    listener: Option<ReadyListener>,
    last_fed: bool,
    done: bool,
    handles: usize,
    feeder_gone: bool,
}

impl ChannelState {
    fn is_ready(&self) -> bool {
        // a disconnected channel is "ready" so the generator pulls and observes the failure
        !self.done && (!self.backlog.is_empty() || self.handles == 0)
    }
}

struct Shared {
    state: Mutex<ChannelState>,
    drained: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pull side of a manually fed body.
///
/// Never blocks: it is ready exactly when the producer has handed over a chunk that was
/// not pulled yet. A manually fed body can not be replayed, so [`reset`](BodyFeeder::reset)
/// fails with [`FeedError::RewindUnsupported`].
pub struct ChannelFeeder {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChannelFeeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("ChannelFeeder")
            .field("backlog_bytes", &state.backlog_bytes)
            .field("done", &state.done)
            .finish_non_exhaustive()
    }
}

impl BodyFeeder for ChannelFeeder {
    fn can_feed(&mut self) -> Result<Chunk, FeedError> {
        let mut state = self.shared.state();
        ensure!(!state.done, FeedError::Finished);

        let Some(chunk) = state.backlog.pop_front() else {
            if state.handles == 0 {
                return Err(FeedError::read(io::Error::new(ErrorKind::UnexpectedEof, "every feed handle dropped before the last chunk")));
            }
            return Err(FeedError::invalid_state("can_feed called on a feeder that is not ready"));
        };

        state.backlog_bytes -= chunk.len();
        state.done = chunk.is_last();
        drop(state);

        self.shared.drained.notify_all();
        Ok(chunk)
    }

    fn is_ready(&self) -> bool {
        self.shared.state().is_ready()
    }

    fn is_done(&self) -> bool {
        self.shared.state().done
    }

    fn notify_ready_to_feed(&mut self, listener: ReadyListener) {
        {
            let mut state = self.shared.state();
            if !state.is_ready() {
                state.listener = Some(listener);
                return;
            }
        }
        listener();
    }

    fn reset(&mut self) -> Result<(), FeedError> {
        Err(FeedError::RewindUnsupported)
    }

    fn may_block(&self) -> bool {
        false
    }
}

impl Drop for ChannelFeeder {
    fn drop(&mut self) {
        self.shared.state().feeder_gone = true;
        self.shared.drained.notify_all();
    }
}

/// Push side of a manually fed body. Cloneable; every clone feeds the same body.
pub struct FeedHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle").finish_non_exhaustive()
    }
}

impl FeedHandle {
    /// Hands a chunk over to the feeder, blocking while the backlog is full.
    ///
    /// Feeding after the last chunk fails with [`FeedError::Finished`]; feeding after
    /// the feeder was dropped fails with [`FeedError::InvalidState`].
    pub fn feed(&self, data: impl Into<Bytes>, last: bool) -> Result<(), FeedError> {
        let chunk = Chunk::new(data.into(), last);

        let listener = {
            let mut state = self.shared.state();
            ensure!(!state.last_fed, FeedError::Finished);

            while !state.feeder_gone && state.backlog_bytes > 0 && state.backlog_bytes + chunk.len() > state.max_backlog_bytes {
                trace!(backlog = state.backlog_bytes, "feed backlog full, waiting for the generator");
                state = self.shared.drained.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            ensure!(!state.feeder_gone, FeedError::invalid_state("feeder dropped"));

            state.last_fed = last;
            state.backlog_bytes += chunk.len();
            state.backlog.push_back(chunk);
            state.listener.take()
        };

        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }

    /// Bytes handed over but not yet pulled by the generator.
    pub fn backlog_bytes(&self) -> usize {
        self.shared.state().backlog_bytes
    }
}

impl Clone for FeedHandle {
    fn clone(&self) -> Self {
        self.shared.state().handles += 1;
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        let listener = {
            let mut state = self.shared.state();
            state.handles -= 1;
            if state.handles == 0 { state.listener.take() } else { None }
        };

        if let Some(listener) = listener {
            listener();
        }
    }
}
