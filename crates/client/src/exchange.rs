use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::pause::{PauseCoordinator, PausePoint};

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process wide, monotonically assigned identifier of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn next() -> Self {
        Self(NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of one in-flight request/response pair, shared by the request executor, the
/// response driver and the handler's [`PauseHandle`](crate::pause::PauseHandle).
#[derive(Debug)]
pub struct ExchangeContext {
    id: ExchangeId,
    pause: PauseCoordinator,
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeContext {
    pub fn new() -> Self {
        Self { id: ExchangeId::next(), pause: PauseCoordinator::new() }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn pause(&self) -> &PauseCoordinator {
        &self.pause
    }

    /// The suspension point the response driver awaits before each event.
    pub fn pause_point(&self) -> PausePoint<'_> {
        PausePoint::new(&self.pause)
    }
}
