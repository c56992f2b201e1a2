use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top level error of one request/response exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: FeedError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: ParseError,
    },

    #[error("exchange aborted by the response handler")]
    Aborted,

    #[error("no slot available after waiting {waited:?}")]
    Throttled { waited: Duration },
}

/// Errors raised while feeding a request body to the transport.
///
/// All of these are recoverable: a retry layer may [`reset`](crate::body::FeedableBodyGenerator::reset)
/// the generator and drive it again.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read body source: {source}")]
    Source { source: io::Error },

    #[error("write failed: {source}")]
    Write {
        #[from]
        source: SendError,
    },

    #[error("write queue did not drain within {timeout:?}")]
    WriteTimeout { timeout: Duration },

    #[error("body transfer cancelled")]
    Cancelled,

    #[error("body source can not be rewound, a retried request would send a different body")]
    RewindUnsupported,

    #[error("failed to rewind body source: {source}")]
    Rewind { source: io::Error },

    #[error("body already finished")]
    Finished,

    #[error("feeder task failed: {reason}")]
    Join { reason: String },

    #[error("invalid feed state: {reason}")]
    InvalidState { reason: String },
}

impl FeedError {
    pub fn read<E: Into<io::Error>>(e: E) -> Self {
        Self::Source { source: e.into() }
    }

    pub fn rewind<E: Into<io::Error>>(e: E) -> Self {
        Self::Rewind { source: e.into() }
    }

    pub fn join<S: ToString>(str: S) -> Self {
        Self::Join { reason: str.to_string() }
    }

    pub fn invalid_state<S: ToString>(str: S) -> Self {
        Self::InvalidState { reason: str.to_string() }
    }
}

/// Errors reported by the transport write path.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("transport closed")]
    Closed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Produces an equivalent error for a second recipient.
    ///
    /// `io::Error` is not `Clone`, so the kind and message are carried over.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::InvalidBody { reason } => Self::InvalidBody { reason: reason.clone() },
            Self::Closed => Self::Closed,
            Self::Io { source } => Self::Io { source: io::Error::new(source.kind(), source.to_string()) },
        }
    }
}

/// Errors raised while receiving response events from the transport.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed before the response completed")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Misuse of the pause/resume protocol.
///
/// These can not happen under correct use of [`PauseHandle`](crate::pause::PauseHandle)
/// and indicate a logic defect in the integration layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseError {
    #[error("can't pause an already paused exchange")]
    AlreadyPaused,

    #[error("can't resume a non-paused exchange")]
    NotPaused,

    #[error("can't override a saved continuation")]
    ContinuationOverride,
}
