//! Pause and resume of response event delivery.
//!
//! A response handler that can not keep up calls [`PauseHandle::request_pause`]; the
//! response driver stops at its next [`PausePoint`] and no further event, error
//! events included, is pulled from the transport until [`PauseHandle::resume`].
//! Pause and resume may race with the driver reaching its suspension point in any
//! order, the [`PauseCoordinator`] serializes them.

mod coordinator;
mod handle;
mod point;

pub use coordinator::{PauseCoordinator, PauseState, SaveOutcome};
pub use handle::PauseHandle;
pub use point::PausePoint;
