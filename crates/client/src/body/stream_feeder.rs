use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

use bytes::Bytes;
use tracing::{trace, warn};

use crate::body::{BodyFeeder, ReadyListener};
use crate::ensure;
use crate::protocol::{Chunk, FeedError};

/// Bytes read from the source per [`StreamFeeder::can_feed`] call by default.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

type RewindFn<R> = fn(&mut R, u64) -> io::Result<()>;

/// Feeds a request body from a blocking [`Read`] source.
///
/// Each [`can_feed`](BodyFeeder::can_feed) call performs one read of at most
/// `buffer_size` bytes. The feeder has no backpressure signal of its own: it is ready
/// until the source is exhausted, and the generator decides when to pull.
pub struct StreamFeeder<R> {
    source: R,
    buffer: Vec<u8>,
    done: bool,
    rewind: Option<(RewindFn<R>, u64)>,
}

impl<R> std::fmt::Debug for StreamFeeder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFeeder")
            .field("buffer_size", &self.buffer.len())
            .field("done", &self.done)
            .field("rewindable", &self.rewind.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Read + Send> StreamFeeder<R> {
    /// Creates a feeder over a source that can not be rewound.
    ///
    /// [`reset`](BodyFeeder::reset) on such a feeder fails with
    /// [`FeedError::RewindUnsupported`].
    pub fn new(source: R) -> Self {
        Self { source, buffer: vec![0; DEFAULT_BUFFER_SIZE], done: false, rewind: None }
    }

    /// Sets how many bytes one read may produce at most.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer = vec![0; buffer_size.max(1)];
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read + Seek + Send> StreamFeeder<R> {
    /// Creates a feeder that rewinds to the source's current position on reset.
    pub fn seekable(mut source: R) -> io::Result<Self> {
        let start = source.stream_position()?;
        let rewind: RewindFn<R> = seek_to::<R>;
        Ok(Self { source, buffer: vec![0; DEFAULT_BUFFER_SIZE], done: false, rewind: Some((rewind, start)) })
    }
}

fn seek_to<R: Seek>(source: &mut R, position: u64) -> io::Result<()> {
    source.seek(SeekFrom::Start(position)).map(|_| ())
}

impl<R: Read + Send> BodyFeeder for StreamFeeder<R> {
    fn can_feed(&mut self) -> Result<Chunk, FeedError> {
        ensure!(!self.done, FeedError::Finished);

        match self.source.read(&mut self.buffer) {
            Ok(0) => {
                self.done = true;
                trace!("body source exhausted");
                Ok(Chunk::eof())
            }
            Ok(read) => Ok(Chunk::data(Bytes::copy_from_slice(&self.buffer[..read]))),
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => Ok(Chunk::data(Bytes::new())),
            Err(e) => Err(FeedError::read(e)),
        }
    }

    fn is_ready(&self) -> bool {
        // the only reason to not be ready is being done
        !self.done
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn notify_ready_to_feed(&mut self, listener: ReadyListener) {
        if self.is_ready() {
            listener();
        }
    }

    fn reset(&mut self) -> Result<(), FeedError> {
        let Some((rewind, start)) = self.rewind else {
            warn!("body source does not support rewinding, a retry would send a different body");
            return Err(FeedError::RewindUnsupported);
        };

        rewind(&mut self.source, start).map_err(FeedError::rewind)?;
        self.done = false;
        Ok(())
    }
}
