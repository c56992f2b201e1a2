use std::time::Duration;

use futures::channel::oneshot;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::protocol::{FeedError, SendError};
use crate::transport::Transport;

/// Waits until the transport reports room in its write queue.
///
/// Registers exactly one writable callback and suspends on it. A failure delivered
/// through the callback, or a callback dropped without being invoked, ends the wait
/// with an error right away: it is never retried.
pub async fn wait_writable<T>(transport: &T, timeout: Option<Duration>, cancel: &CancellationToken) -> Result<(), FeedError>
where
    T: Transport + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    transport.notify_writable(Box::new(move |result| {
        // the waiter may already be gone after a timeout or a cancellation
        let _ = tx.send(result);
    }));

    let writable = async move {
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FeedError::from(e)),
            Err(_canceled) => Err(FeedError::from(SendError::Closed)),
        }
    };

    with_deadline(writable, timeout, cancel).await
}

/// Blocks the calling thread until the transport has room in its write queue.
///
/// Returns at once when the queue is not saturated. Otherwise it drives
/// [`wait_writable`] to completion through `handle`, so the wait is bounded by
/// `timeout` and can be interrupted through `cancel`.
///
/// # Panics
///
/// Must be called from a thread outside the runtime's async context (a plain thread
/// or a `spawn_blocking` worker), see [`Handle::block_on`]. On a `current_thread`
/// runtime timers only advance while another thread drives `Runtime::block_on`.
pub fn block_until_writable<T>(
    handle: &Handle,
    transport: &T,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), FeedError>
where
    T: Transport + ?Sized,
{
    if !transport.is_saturated() {
        return Ok(());
    }

    trace!(depth = transport.write_queue_depth(), "write queue full, blocking until writable");
    handle.block_on(wait_writable(transport, timeout, cancel))
}

/// Runs `future` bounded by an optional timeout and a cancellation token.
pub(crate) async fn with_deadline<F, T>(future: F, timeout: Option<Duration>, cancel: &CancellationToken) -> Result<T, FeedError>
where
    F: Future<Output = Result<T, FeedError>>,
{
    let bounded = async move {
        match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, future).await {
                Ok(result) => result,
                Err(_elapsed) => Err(FeedError::WriteTimeout { timeout }),
            },
            None => future.await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FeedError::Cancelled),
        result = bounded => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::io;
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_once_writable_fires() {
        let transport = Arc::new(MockTransport::new(1));
        transport.set_depth(1);

        let cancel = CancellationToken::new();
        let waiting = {
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            tokio::spawn(async move { wait_writable(&*transport, None, &cancel).await })
        };

        while transport.pending_callbacks() == 0 {
            tokio::task::yield_now().await;
        }
        transport.set_depth(0);
        transport.fire_writable(|| Ok(()));

        assert!(waiting.await.unwrap().is_ok());
        assert_eq!(transport.registrations(), 1);
    }

    #[tokio::test]
    async fn times_out_when_never_writable() {
        let transport = MockTransport::new(1);
        transport.set_depth(1);

        let result = wait_writable(&transport, Some(Duration::from_millis(20)), &CancellationToken::new()).await;
        assert!(matches!(result, Err(FeedError::WriteTimeout { .. })));
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let transport = MockTransport::new(1);
        transport.set_depth(1);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = wait_writable(&transport, None, &cancel).await;
        assert!(matches!(result, Err(FeedError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_wait_is_abandoned_on_execution_error() {
        let transport = Arc::new(MockTransport::new(1));
        transport.set_depth(1);
        let handle = Handle::current();

        let blocked = {
            let transport = Arc::clone(&transport);
            tokio::task::spawn_blocking(move || {
                block_until_writable(&handle, &*transport, Some(Duration::from_secs(30)), &CancellationToken::new())
            })
        };

        while transport.pending_callbacks() == 0 {
            tokio::task::yield_now().await;
        }
        transport.fire_writable(|| Err(SendError::io(io::Error::other("mocked exception"))));

        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(FeedError::Write { source: SendError::Io { .. } })));
        assert_eq!(transport.registrations(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_wait_skips_registration_when_room() {
        let transport = Arc::new(MockTransport::new(4));
        let handle = Handle::current();

        let result = {
            let transport = Arc::clone(&transport);
            tokio::task::spawn_blocking(move || block_until_writable(&handle, &*transport, None, &CancellationToken::new()))
                .await
                .unwrap()
        };

        assert!(result.is_ok());
        assert_eq!(transport.registrations(), 0);
    }
}
