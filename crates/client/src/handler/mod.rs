//! Response handlers: the caller-supplied consumers of a request's outcome.
//!
//! A [`ResponseHandler`] is moved into the client together with its request and is
//! invoked at most once, with either the complete response or a classified error.
//! Cancellation drops the handler without invoking it.
//!
//! Two adapters cover the common cases:
//!
//! - [`make_handler`] wraps a closure receiving `Result<ClientResponse, RequestError>`
//! - [`response_channel`] pairs a handler with a [`ResponseFuture`] that can be awaited
//!   elsewhere, and which resolves to [`RequestError::Cancelled`] when the request is
//!   cancelled

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tracing::trace;

use crate::protocol::{ClientResponse, RequestError};

/// Consumer of the outcome of one request.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseHandler {
    /// Called with the complete response.
    fn success(&mut self, response: ClientResponse);

    /// Called when the exchange could not complete.
    fn failure(&mut self, error: RequestError);
}

/// A [`ResponseHandler`] backed by a closure, see [`make_handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: Option<F>,
}

impl<F> ResponseHandler for HandlerFn<F>
where
    F: FnOnce(Result<ClientResponse, RequestError>),
{
    fn success(&mut self, response: ClientResponse) {
        if let Some(f) = self.f.take() {
            f(Ok(response));
        }
    }

    fn failure(&mut self, error: RequestError) {
        if let Some(f) = self.f.take() {
            f(Err(error));
        }
    }
}

/// Builds a handler from a closure that receives the outcome.
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: FnOnce(Result<ClientResponse, RequestError>),
{
    HandlerFn { f: Some(f) }
}

/// Handler half of [`response_channel`].
#[derive(Debug)]
pub struct ChannelHandler {
    sender: Option<oneshot::Sender<Result<ClientResponse, RequestError>>>,
}

impl ChannelHandler {
    fn deliver(&mut self, result: Result<ClientResponse, RequestError>) {
        if let Some(sender) = self.sender.take() {
            if sender.send(result).is_err() {
                trace!("response future dropped before the outcome arrived");
            }
        }
    }
}

impl ResponseHandler for ChannelHandler {
    fn success(&mut self, response: ClientResponse) {
        self.deliver(Ok(response));
    }

    fn failure(&mut self, error: RequestError) {
        self.deliver(Err(error));
    }
}

pin_project! {
    /// Resolves to the outcome delivered to the paired [`ChannelHandler`].
    #[derive(Debug)]
    pub struct ResponseFuture {
        #[pin]
        receiver: oneshot::Receiver<Result<ClientResponse, RequestError>>,
    }
}

impl Future for ResponseFuture {
    type Output = Result<ClientResponse, RequestError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().receiver.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // the handler was dropped uninvoked: the request was cancelled
            Poll::Ready(Err(_)) => Poll::Ready(Err(RequestError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Creates a handler and the future that observes its outcome.
pub fn response_channel() -> (ChannelHandler, ResponseFuture) {
    let (sender, receiver) = oneshot::channel();
    (ChannelHandler { sender: Some(sender) }, ResponseFuture { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Response, StatusCode};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn closure_handler_runs_once() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&calls);
        let mut handler = make_handler(move |result: Result<ClientResponse, RequestError>| {
            recorded.borrow_mut().push(result.map(|response| response.status()));
        });

        handler.failure(RequestError::Transport { code: 104 });
        handler.success(Response::new(Bytes::new()));

        assert_eq!(*calls.borrow(), vec![Err(RequestError::Transport { code: 104 })]);
    }

    #[tokio::test]
    async fn channel_delivers_response() {
        let (mut handler, future) = response_channel();
        handler.success(Response::builder().status(StatusCode::ACCEPTED).body(Bytes::from_static(b"queued")).unwrap());

        let response = future.await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body(), &Bytes::from_static(b"queued"));
    }

    #[tokio::test]
    async fn dropped_handler_reads_as_cancelled() {
        let (handler, future) = response_channel();
        drop(handler);

        assert_eq!(future.await.unwrap_err(), RequestError::Cancelled);
    }
}
