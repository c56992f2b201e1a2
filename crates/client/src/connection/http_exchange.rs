use std::sync::Arc;

use futures::Stream;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::body::{BodyFeeder, FeedableBodyGenerator};
use crate::connection::ResponseDriver;
use crate::exchange::{ExchangeContext, ExchangeId};
use crate::handler::ResponseHandler;
use crate::pause::PauseHandle;
use crate::protocol::{FeedError, HttpError, Message, ParseError, ResponseHead};
use crate::throttle::Throttle;
use crate::transport::Transport;

/// One request/response interaction over an established transport.
///
/// The request body and the response are handled concurrently: a server may answer
/// before the body has been fully sent (e.g. with `413 Payload Too Large`), and a
/// handler pausing the response must not stall the upload.
pub struct HttpExchange<T, S> {
    context: Arc<ExchangeContext>,
    transport: T,
    driver: ResponseDriver<S>,
    throttle: Option<Throttle>,
}

impl<T, S> std::fmt::Debug for HttpExchange<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExchange")
            .field("id", &self.context.id())
            .field("throttled", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}

enum Outcome<O> {
    Response(Result<O, HttpError>),
    BodyFailed(FeedError),
}

impl<T, S> HttpExchange<T, S>
where
    T: Transport,
    S: Stream<Item = Result<Message<ResponseHead>, ParseError>> + Unpin,
{
    pub fn new(transport: T, events: S) -> Self {
        let context = Arc::new(ExchangeContext::new());
        let driver = ResponseDriver::new(events, Arc::clone(&context));
        Self { context, transport, driver, throttle: None }
    }

    /// Holds a slot of `throttle` for as long as the exchange runs.
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn id(&self) -> ExchangeId {
        self.context.id()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.driver.pause_handle().clone()
    }

    /// Sends the body produced by `generator` and delivers the response to `handler`.
    ///
    /// The response is delivered as it arrives, even while the body is still being sent.
    /// The exchange completes with the handler's output once both the response is
    /// complete and the body has been sent. A body that fails after a complete response
    /// only ends the upload; before that it fails the exchange, and like every other
    /// failure it reaches [`ResponseHandler::on_error`] only while the exchange is not
    /// paused. A failed response drops the body transfer.
    pub async fn execute<F, H>(mut self, generator: &mut FeedableBodyGenerator<F>, handler: &mut H) -> Result<H::Output, HttpError>
    where
        F: BodyFeeder + 'static,
        H: ResponseHandler,
    {
        let span = info_span!("exchange", id = %self.context.id());

        async move {
            let _permit = match &self.throttle {
                Some(throttle) => match throttle.acquire().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        handler.on_error(&e);
                        return Err(e);
                    }
                },
                None => None,
            };

            match self.run(generator, handler).await {
                Outcome::Response(Ok(output)) => Ok(output),
                Outcome::Response(Err(e)) => {
                    if !matches!(e, HttpError::Aborted) {
                        handler.on_error(&e);
                    }
                    Err(e)
                }
                Outcome::BodyFailed(e) => {
                    error!("request body transfer failed, cause {}", e);
                    let e = HttpError::from(e);
                    self.context.pause_point().await;
                    handler.on_error(&e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run<F, H>(&mut self, generator: &mut FeedableBodyGenerator<F>, handler: &mut H) -> Outcome<H::Output>
    where
        F: BodyFeeder + 'static,
        H: ResponseHandler,
    {
        let transfer = generator.transfer(&self.transport);
        let delivery = self.driver.deliver(handler);
        tokio::pin!(transfer, delivery);

        let mut body_sent = false;
        let mut response: Option<H::Output> = None;
        loop {
            tokio::select! {
                biased;
                sent = &mut transfer, if !body_sent => match sent {
                    Ok(summary) => {
                        debug!(bytes = summary.bytes, chunks = summary.chunks, "request body sent");
                        if let Some(output) = response.take() {
                            return Outcome::Response(Ok(output));
                        }
                        body_sent = true;
                    }
                    Err(e) => match response.take() {
                        // e.g. the server closed the connection after answering an oversized body
                        Some(output) => {
                            warn!("request body not fully sent after the response completed, cause {}", e);
                            return Outcome::Response(Ok(output));
                        }
                        None => return Outcome::BodyFailed(e),
                    },
                },
                delivered = &mut delivery, if response.is_none() => match delivered {
                    Ok(output) if !body_sent => {
                        debug!("response completed before the request body was fully sent");
                        response = Some(output);
                    }
                    delivered => return Outcome::Response(delivered),
                },
            }
        }
    }
}
