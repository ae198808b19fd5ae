use std::fmt;

use http::Method;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::connection::{Authority, Connection, ConnectionId};
use crate::handler::ResponseHandler;
use crate::protocol::{ClientResponse, RequestDescriptor, RequestError};

/// Stable identity of a request, also the key of a connection's registration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Constructed, possibly waiting for a connection.
    Created,
    /// Handed to its connection, not yet fully written.
    Sending,
    AwaitingResponse,
    Completed,
    Failed,
    Cancelled,
}

impl PendingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("request {id} can't be sent in state {state:?}")]
    AlreadySent { id: RequestId, state: PendingState },
}

/// One request from construction until its handler has fired or it was cancelled.
pub struct PendingRequest {
    id: RequestId,
    authority: Authority,
    descriptor: RequestDescriptor,
    handler: Option<Box<dyn ResponseHandler>>,
    last_error: Option<i32>,
    connection: Option<ConnectionId>,
    state: PendingState,
}

impl PendingRequest {
    pub fn new(id: RequestId, authority: Authority, descriptor: RequestDescriptor, handler: Box<dyn ResponseHandler>) -> Self {
        Self { id, authority, descriptor, handler: Some(handler), last_error: None, connection: None, state: PendingState::Created }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        self.descriptor.method()
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn state(&self) -> PendingState {
        self.state
    }

    /// The code of the failure that ended this request, if it failed.
    pub fn last_error(&self) -> Option<i32> {
        self.last_error
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The pooled connection this request was sent on.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Writes the request to `connection`, opening it first when needed.
    ///
    /// A connection that can't be opened or written to fails the request through the
    /// handler, exactly like a failure reported later by the connection. The only error
    /// returned here is calling `send` twice.
    pub fn send(&mut self, connection_id: ConnectionId, connection: &mut dyn Connection) -> Result<(), StateError> {
        if self.state != PendingState::Created {
            return Err(StateError::AlreadySent { id: self.id, state: self.state });
        }

        self.connection = Some(connection_id);
        self.state = PendingState::Sending;

        let opened = if connection.is_open() { Ok(()) } else { connection.open() };
        let written = opened.and_then(|()| connection.write(self.id, &self.descriptor));

        match written {
            Ok(()) => {
                trace!(request_id = %self.id, connection_id = %connection_id, method = %self.method(), "request handed to connection");
            }
            Err(failure) => {
                warn!(request_id = %self.id, connection_id = %connection_id, cause = %failure, "can't send request");
                connection.detach(self.id);
                self.on_error(failure.code());
            }
        }
        Ok(())
    }

    /// The connection finished writing the request.
    pub fn on_sent(&mut self) {
        if self.state == PendingState::Sending {
            self.state = PendingState::AwaitingResponse;
        } else {
            trace!(request_id = %self.id, state = ?self.state, "ignore send completion");
        }
    }

    /// Delivers the complete response. Returns whether it was accepted.
    pub fn on_response(&mut self, response: ClientResponse) -> bool {
        if !matches!(self.state, PendingState::Sending | PendingState::AwaitingResponse) {
            warn!(request_id = %self.id, state = ?self.state, status = %response.status(), "ignore response");
            return false;
        }

        self.state = PendingState::Completed;
        debug!(request_id = %self.id, status = %response.status(), "request completed");
        if let Some(mut handler) = self.handler.take() {
            handler.success(response);
        }
        true
    }

    /// Fails the exchange with an error code. Returns whether the failure was accepted.
    pub fn on_error(&mut self, code: i32) -> bool {
        if !matches!(self.state, PendingState::Sending | PendingState::AwaitingResponse) {
            warn!(request_id = %self.id, state = ?self.state, code, "ignore error");
            return false;
        }

        self.last_error = Some(code);
        self.state = PendingState::Failed;

        let error = RequestError::from_code(code);
        debug!(request_id = %self.id, %error, "request failed");
        if let Some(mut handler) = self.handler.take() {
            handler.failure(error);
        }
        true
    }

    /// Cancels the request without notifying its handler.
    ///
    /// `connection` is the connection the request was sent on, if any; the request is
    /// detached from it so later outcomes are discarded there. Returns false when the
    /// request was already terminal.
    pub fn cancel(&mut self, connection: Option<&mut dyn Connection>) -> bool {
        if self.is_terminal() {
            trace!(request_id = %self.id, state = ?self.state, "ignore cancel");
            return false;
        }

        if let Some(connection) = connection {
            connection.detach(self.id);
        }

        self.state = PendingState::Cancelled;
        self.handler = None;
        debug!(request_id = %self.id, "request cancelled");
        true
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("method", self.method())
            .field("uri", self.descriptor.uri())
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
