use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, trace};

use crate::exchange::ExchangeContext;
use crate::handler::{Action, ResponseHandler};
use crate::pause::PauseHandle;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, ResponseHead};

/// Delivers the response events of one exchange to a [`ResponseHandler`].
///
/// Before pulling each event from the transport the driver passes the exchange's
/// pause point, so a paused handler receives nothing, not even a transport error,
/// until it resumes. Unpulled events stay in the transport, which is what slows the
/// peer down.
pub struct ResponseDriver<S> {
    events: S,
    exchange: Arc<ExchangeContext>,
    pause: PauseHandle,
    head_received: bool,
}

impl<S> std::fmt::Debug for ResponseDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDriver")
            .field("exchange", &self.exchange.id())
            .field("head_received", &self.head_received)
            .finish_non_exhaustive()
    }
}

impl<S> ResponseDriver<S>
where
    S: Stream<Item = Result<Message<ResponseHead>, ParseError>> + Unpin,
{
    pub fn new(events: S, exchange: Arc<ExchangeContext>) -> Self {
        let pause = PauseHandle::new(Arc::clone(&exchange));
        Self { events, exchange, pause, head_received: false }
    }

    pub fn pause_handle(&self) -> &PauseHandle {
        &self.pause
    }

    /// Delivers events until the response completes or fails.
    ///
    /// A failure is reported to [`ResponseHandler::on_error`] before it is returned,
    /// except [`HttpError::Aborted`] which the handler asked for itself.
    pub async fn drive<H>(&mut self, handler: &mut H) -> Result<H::Output, HttpError>
    where
        H: ResponseHandler,
    {
        let result = self.deliver(handler).await;
        match &result {
            Ok(_) | Err(HttpError::Aborted) => {}
            Err(e) => handler.on_error(e),
        }
        result
    }

    /// Like [`drive`](Self::drive), but leaves reporting a failure to the caller.
    pub(crate) async fn deliver<H>(&mut self, handler: &mut H) -> Result<H::Output, HttpError>
    where
        H: ResponseHandler,
    {
        loop {
            self.exchange.pause_point().await;

            let event = match self.events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!("can't receive next response event, cause {}", e);
                    return Err(e.into());
                }
                None => {
                    error!("response stream ended before the response completed");
                    return Err(ParseError::UnexpectedEof.into());
                }
            };

            let action = match event {
                Message::Header(head) => {
                    if self.head_received {
                        return Err(ParseError::invalid_body("received a second response head").into());
                    }
                    self.head_received = true;
                    debug!(status = %head.status(), "response head received");
                    handler.on_head(head, &self.pause)
                }
                Message::Payload(PayloadItem::Chunk(bytes)) => {
                    if !self.head_received {
                        return Err(ParseError::invalid_body("need header while receive body").into());
                    }
                    trace!(len = bytes.len(), "response chunk received");
                    handler.on_chunk(bytes, &self.pause)
                }
                Message::Payload(PayloadItem::Eof) => {
                    if !self.head_received {
                        return Err(ParseError::invalid_body("response ended without a head").into());
                    }
                    debug!("response completed");
                    return Ok(handler.on_completed());
                }
            };

            if action == Action::Abort {
                debug!("response handler aborted the exchange");
                return Err(HttpError::Aborted);
            }
        }
    }
}
