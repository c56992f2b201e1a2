use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::channel::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::body::BodyFeeder;
use crate::body::pending::PendingQueue;
use crate::ensure;
use crate::protocol::{Chunk, FeedError};
use crate::transport::{Transport, wait_writable, with_deadline};

/// Default ceiling of written but unacknowledged body bytes.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 64 * 1024;

/// Pause before pulling again after a source reported a transient empty read.
const TRANSIENT_READ_BACKOFF: Duration = Duration::from_millis(1);

/// Tuning of a [`FeedableBodyGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    max_pending_bytes: usize,
    write_timeout: Option<Duration>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { max_pending_bytes: DEFAULT_MAX_PENDING_BYTES, write_timeout: None }
    }
}

impl FeedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the bytes handed to the transport but not yet consumed. At least one byte.
    pub fn with_max_pending_bytes(mut self, max_pending_bytes: usize) -> Self {
        self.max_pending_bytes = max_pending_bytes.max(1);
        self
    }

    /// Bounds every single wait of a transfer: writable notification, feeder readiness
    /// and acknowledgements.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = Some(write_timeout);
        self
    }

    pub fn max_pending_bytes(&self) -> usize {
        self.max_pending_bytes
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }
}

/// Outcome of one completed body transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// body bytes written
    pub bytes: u64,
    /// chunks written, the last one included
    pub chunks: usize,
    /// how many times the write queue was found saturated
    pub saturations: usize,
}

/// Rate-matches a [`BodyFeeder`] to the bounded write queue of a [`Transport`].
///
/// The generator pulls chunks while the feeder is ready, the transport has queue
/// capacity and the pending bytes stay below the configured ceiling. It suspends on
/// the transport's writable notification or the feeder's ready listener, never by
/// polling, and never blocks the thread driving it: a feeder that may block is pulled
/// on a blocking worker.
///
/// A transfer future dropped before it completes (a timeout, a failed response)
/// leaves the body partially sent; the generator then refuses to transfer again until
/// it is [`reset`](Self::reset).
///
/// # Example
///
/// ```no_run
/// use micro_http_client::body::{FeedConfig, FeedableBodyGenerator, StreamFeeder};
/// use micro_http_client::protocol::PayloadSize;
/// use micro_http_client::transport::IoTransport;
///
/// # async fn upload(socket: tokio::net::TcpStream) -> Result<(), Box<dyn std::error::Error>> {
/// let file = std::fs::File::open("payload.bin")?;
/// let (transport, writer) = IoTransport::new(socket, PayloadSize::Chunked, 16);
/// let writing = tokio::spawn(writer.run());
///
/// let config = FeedConfig::new().with_max_pending_bytes(32 * 1024);
/// let mut generator = FeedableBodyGenerator::with_config(StreamFeeder::seekable(file)?, config);
/// let summary = generator.transfer(&transport).await?;
/// println!("sent {} bytes", summary.bytes);
///
/// let _socket = writing.await??;
/// # Ok(())
/// # }
/// ```
pub struct FeedableBodyGenerator<F> {
    // shared with the blocking worker of an in-flight read, which may outlive the transfer
    feeder: Arc<Mutex<F>>,
    config: FeedConfig,
    pending: PendingQueue,
    staged: Option<Chunk>,
    started: bool,
    finished: bool,
    cancel: CancellationToken,
}

impl<F> std::fmt::Debug for FeedableBodyGenerator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedableBodyGenerator")
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("staged", &self.staged.as_ref().map(Chunk::len))
            .field("started", &self.started)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<F> FeedableBodyGenerator<F>
where
    F: BodyFeeder + 'static,
{
    pub fn new(feeder: F) -> Self {
        Self::with_config(feeder, FeedConfig::default())
    }

    pub fn with_config(feeder: F, config: FeedConfig) -> Self {
        Self {
            feeder: Arc::new(Mutex::new(feeder)),
            pending: PendingQueue::new(config.max_pending_bytes),
            config,
            staged: None,
            started: false,
            finished: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts an in-flight [`transfer`](Self::transfer) with [`FeedError::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Bytes written but not yet acknowledged by the transport.
    pub fn pending_bytes(&self) -> usize {
        self.pending.bytes()
    }

    /// The last chunk has been written and acknowledged.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Re-arms the generator so the same body can be sent again, e.g. for a retried request.
    ///
    /// Clears pending writes and any staged remainder, then rewinds the feeder. A read
    /// left running on a blocking worker by a dropped transfer is waited for first.
    /// Fails with [`FeedError::RewindUnsupported`] when the feeder can not replay its
    /// body; the generator then stays unusable for a retry.
    pub fn reset(&mut self) -> Result<(), FeedError> {
        self.pending.clear();
        self.staged = None;
        lock(&self.feeder)?.reset()?;
        self.started = false;
        self.finished = false;
        Ok(())
    }

    /// Feeds the whole body into `transport`.
    ///
    /// Resolves once the last chunk has been acknowledged and the end of body signaled.
    /// Any feeder, write or wait failure aborts the transfer; it is never retried here.
    pub async fn transfer<T>(&mut self, transport: &T) -> Result<FeedSummary, FeedError>
    where
        T: Transport + ?Sized,
    {
        ensure!(!self.finished, FeedError::Finished);
        ensure!(!self.started, FeedError::invalid_state("an interrupted transfer must be reset before feeding again"));
        self.started = true;

        let capacity = transport.write_queue_capacity();
        debug!(capacity, max_pending = self.config.max_pending_bytes, "start feeding request body");

        let mut summary = FeedSummary::default();
        loop {
            self.pending.reap()?;

            if transport.write_queue_depth() >= capacity {
                summary.saturations += 1;
                self.on_full_write_queue(transport).await?;
                continue;
            }

            // at the ceiling nothing is pulled until the transport consumed something
            if self.staged.is_none() && self.pending.room() == 0 {
                self.await_pending(false).await?;
                continue;
            }

            let mut chunk = match self.staged.take() {
                Some(chunk) => chunk,
                None => {
                    let (ready, done) = {
                        let feeder = lock(&self.feeder)?;
                        (feeder.is_ready(), feeder.is_done())
                    };
                    if !ready {
                        ensure!(!done, FeedError::invalid_state("feeder done without a last chunk"));
                        self.wait_ready().await?;
                        continue;
                    }
                    self.pull().await?
                }
            };

            let room = self.pending.room();
            if chunk.len() > room {
                if room == 0 {
                    self.staged = Some(chunk);
                    self.await_pending(false).await?;
                    continue;
                }
                let head = chunk.split_to(room);
                self.staged = Some(chunk);
                chunk = head;
            }

            if chunk.is_empty() && !chunk.is_last() {
                trace!("transient empty read, nothing to write");
                tokio::time::sleep(TRANSIENT_READ_BACKOFF).await;
                continue;
            }

            let len = chunk.len();
            let last = chunk.is_last();
            trace!(len, last, pending = self.pending.bytes(), "write chunk");
            self.pending.push(len, transport.write(chunk));
            summary.bytes += len as u64;
            summary.chunks += 1;

            if last {
                self.await_pending(true).await?;
                transport.end_body();
                self.started = false;
                self.finished = true;
                debug!(bytes = summary.bytes, chunks = summary.chunks, saturations = summary.saturations, "request body fed");
                return Ok(summary);
            }
        }
    }

    async fn on_full_write_queue<T>(&mut self, transport: &T) -> Result<(), FeedError>
    where
        T: Transport + ?Sized,
    {
        debug!(depth = transport.write_queue_depth(), capacity = transport.write_queue_capacity(), "write queue full, waiting until writable");
        wait_writable(transport, self.config.write_timeout, &self.cancel).await
    }

    async fn wait_ready(&mut self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.feeder)?.notify_ready_to_feed(Box::new(move || {
            let _ = tx.send(());
        }));

        trace!("feeder not ready, waiting");
        let ready = async move { rx.await.map_err(|_canceled| FeedError::invalid_state("feeder dropped its ready listener")) };
        with_deadline(ready, self.config.write_timeout, &self.cancel).await
    }

    async fn await_pending(&mut self, drain: bool) -> Result<(), FeedError> {
        let pending = &mut self.pending;
        let acknowledged = async move {
            let result = if drain { pending.drain().await } else { pending.wait_front().await };
            result.map_err(FeedError::from)
        };
        with_deadline(acknowledged, self.config.write_timeout, &self.cancel).await
    }

    async fn pull(&mut self) -> Result<Chunk, FeedError> {
        let may_block = lock(&self.feeder)?.may_block();
        if !may_block {
            return lock(&self.feeder)?.can_feed();
        }

        let feeder = Arc::clone(&self.feeder);
        tokio::task::spawn_blocking(move || {
            let mut source = lock(&feeder)?;
            source.can_feed()
        })
        .await
        .map_err(FeedError::join)?
    }
}

fn lock<F>(feeder: &Mutex<F>) -> Result<MutexGuard<'_, F>, FeedError> {
    feeder.lock().map_err(|_poisoned| FeedError::invalid_state("feeder poisoned by a panicking read"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{StreamFeeder, channel_feeder};
    use crate::protocol::SendError;
    use crate::transport::mock::{MockTransport, init_tracing};
    use std::io::{self, Cursor, Read, Seek, SeekFrom};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DATA: &[u8] = b"Hello, world!";

    fn generator(data: &'static [u8], buffer_size: usize) -> FeedableBodyGenerator<StreamFeeder<&'static [u8]>> {
        FeedableBodyGenerator::new(StreamFeeder::new(data).with_buffer_size(buffer_size))
    }

    #[tokio::test]
    async fn feeds_hello_world_with_buffer_of_six() {
        init_tracing();
        let transport = MockTransport::new(100);
        let mut generator = generator(DATA, 6);

        let summary = generator.transfer(&transport).await.unwrap();

        assert_eq!(transport.written_bytes(), DATA);
        let written = transport.written();
        assert_eq!(written.iter().filter(|chunk| chunk.is_last()).count(), 1);
        assert!(written.last().unwrap().is_last());
        assert!(transport.ended());
        assert!(generator.is_finished());
        assert_eq!(summary, FeedSummary { bytes: 13, chunks: 4, saturations: 0 });
    }

    #[tokio::test]
    async fn empty_body_is_one_empty_last_chunk() {
        let transport = MockTransport::new(100);
        let mut generator = generator(b"", 6);

        generator.transfer(&transport).await.unwrap();

        assert_eq!(transport.written(), vec![Chunk::eof()]);
        assert!(transport.ended());
    }

    #[tokio::test]
    async fn pending_bytes_never_exceed_ceiling() {
        init_tracing();
        let transport = Arc::new(MockTransport::manual_ack(100));
        let data: &'static [u8] = b"aAbBcCdDeEfFgGhHiIjJkKlLmMnNoOpPqQrRsStTuUvVwWxXyYzZ";
        let config = FeedConfig::new().with_max_pending_bytes(5);
        let mut generator = FeedableBodyGenerator::with_config(StreamFeeder::new(data).with_buffer_size(4), config);

        let feeding = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { generator.transfer(&*transport).await })
        };

        while !feeding.is_finished() {
            transport.ack_next();
            tokio::task::yield_now().await;
        }

        let summary = feeding.await.unwrap().unwrap();
        assert_eq!(summary.bytes, data.len() as u64);
        assert_eq!(transport.written_bytes(), data);
        assert!(transport.max_in_flight_bytes() <= 5);
        assert!(transport.written().iter().all(|chunk| chunk.len() <= 5));
    }

    #[tokio::test]
    async fn full_write_queue_registers_one_writable_callback_then_drains() {
        let transport = Arc::new(MockTransport::new(100));
        transport.set_depth(100);
        let mut generator = generator(DATA, DATA.len() / 2);

        let feeding = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { generator.transfer(&*transport).await })
        };

        while transport.pending_callbacks() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(transport.written().is_empty());

        transport.set_depth(0);
        transport.fire_writable(|| Ok(()));

        let summary = feeding.await.unwrap().unwrap();
        assert_eq!(summary.saturations, 1);
        assert_eq!(transport.registrations(), 1);
        assert_eq!(transport.written_bytes(), DATA);
    }

    #[tokio::test]
    async fn writable_failure_aborts_transfer() {
        let transport = Arc::new(MockTransport::new(1));
        transport.set_depth(1);
        let mut generator = generator(DATA, 4);

        let feeding = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { generator.transfer(&*transport).await })
        };

        while transport.pending_callbacks() == 0 {
            tokio::task::yield_now().await;
        }
        transport.fire_writable(|| Err(SendError::io(io::Error::other("mocked exception"))));

        assert!(matches!(feeding.await.unwrap(), Err(FeedError::Write { .. })));
        assert!(!transport.ended());
    }

    #[tokio::test]
    async fn cancellation_stops_a_saturated_transfer() {
        let transport = MockTransport::new(1);
        transport.set_depth(1);
        let mut generator = generator(DATA, 4);

        generator.cancellation_token().cancel();
        let result = generator.transfer(&transport).await;

        assert!(matches!(result, Err(FeedError::Cancelled)));
        assert!(transport.written().is_empty());
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[tokio::test]
    async fn source_failure_is_surfaced() {
        let transport = MockTransport::new(100);
        let mut generator = FeedableBodyGenerator::new(StreamFeeder::new(Broken));

        let result = generator.transfer(&transport).await;

        assert!(matches!(result, Err(FeedError::Source { .. })));
        assert!(!transport.ended());
        assert!(!generator.is_finished());
    }

    #[tokio::test]
    async fn no_write_after_end_of_body() {
        let transport = MockTransport::new(100);
        let mut generator = generator(DATA, 6);

        generator.transfer(&transport).await.unwrap();
        let again = generator.transfer(&transport).await;

        assert!(matches!(again, Err(FeedError::Finished)));
        assert_eq!(transport.writes_after_end(), 0);
    }

    #[tokio::test]
    async fn reset_replays_seekable_body() {
        let mut generator = FeedableBodyGenerator::new(StreamFeeder::seekable(Cursor::new(DATA.to_vec())).unwrap().with_buffer_size(5));

        let first = MockTransport::new(100);
        generator.transfer(&first).await.unwrap();

        generator.reset().unwrap();
        let retry = MockTransport::new(100);
        generator.transfer(&retry).await.unwrap();

        assert_eq!(retry.written_bytes(), DATA);
    }

    #[tokio::test]
    async fn reset_of_plain_stream_is_refused() {
        let transport = MockTransport::new(100);
        let mut generator = generator(DATA, 6);
        generator.transfer(&transport).await.unwrap();

        assert!(matches!(generator.reset(), Err(FeedError::RewindUnsupported)));
        assert!(matches!(generator.transfer(&transport).await, Err(FeedError::Finished)));
    }

    #[tokio::test]
    async fn manual_feeder_wakes_generator() {
        let transport = Arc::new(MockTransport::new(100));
        let (feeder, handle) = channel_feeder(1024);
        let mut generator = FeedableBodyGenerator::new(feeder);

        let feeding = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { generator.transfer(&*transport).await })
        };

        let producer = std::thread::spawn(move || {
            for part in [&b"Hello"[..], &b", "[..], &b"world"[..]] {
                handle.feed(part, false).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            handle.feed(&b"!"[..], true).unwrap();
        });

        let summary = feeding.await.unwrap().unwrap();
        producer.join().unwrap();

        assert_eq!(transport.written_bytes(), DATA);
        assert_eq!(summary.chunks, 4);
        assert!(transport.written().last().unwrap().is_last());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn transfer_can_be_spawned() {
        let transport = MockTransport::new(1);
        let mut generator = generator(DATA, 4);
        assert_send(&generator.transfer(&transport));
    }

    struct CountingReads {
        source: &'static [u8],
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReads {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.source.read(buf)
        }
    }

    #[tokio::test]
    async fn nothing_is_pulled_while_pending_bytes_sit_at_the_ceiling() {
        let transport = Arc::new(MockTransport::manual_ack(100));
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingReads { source: b"aaaaabbbbbcccccddddd", reads: Arc::clone(&reads) };
        let config = FeedConfig::new().with_max_pending_bytes(5);
        let mut generator = FeedableBodyGenerator::with_config(StreamFeeder::new(source).with_buffer_size(5), config);

        let feeding = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { generator.transfer(&*transport).await })
        };

        while transport.written().is_empty() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.written().len(), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        while !feeding.is_finished() {
            transport.ack_next();
            tokio::task::yield_now().await;
        }
        assert_eq!(feeding.await.unwrap().unwrap().bytes, 20);
        assert_eq!(transport.written_bytes(), b"aaaaabbbbbcccccddddd");
    }

    /// A seekable source taking a while for every read.
    struct SlowSource {
        source: Cursor<Vec<u8>>,
        delay: Duration,
    }

    impl Read for SlowSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(self.delay);
            self.source.read(buf)
        }
    }

    impl Seek for SlowSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.source.seek(pos)
        }
    }

    #[tokio::test]
    async fn transfer_dropped_during_blocking_read_can_be_reset() {
        let source = SlowSource { source: Cursor::new(DATA.to_vec()), delay: Duration::from_millis(100) };
        let mut generator = FeedableBodyGenerator::new(StreamFeeder::seekable(source).unwrap().with_buffer_size(5));
        let transport = MockTransport::new(100);

        let interrupted = tokio::time::timeout(Duration::from_millis(20), generator.transfer(&transport)).await;
        assert!(interrupted.is_err());
        assert!(matches!(generator.transfer(&transport).await, Err(FeedError::InvalidState { .. })));

        generator.reset().unwrap();
        let retry = MockTransport::new(100);
        generator.transfer(&retry).await.unwrap();

        assert_eq!(retry.written_bytes(), DATA);
        assert!(generator.is_finished());
    }
}
