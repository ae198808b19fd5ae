//! Connections: the transport side of a request's lifecycle.
//!
//! A [`Connection`] is the collaborator a pending request writes itself to. It never
//! calls back into the request directly; progress is reported as [`ConnectionEvent`]s
//! on the client's event channel and dispatched by the client on its own stack, so a
//! request's state machine is never re-entered while it is inside one of its own
//! transitions.
//!
//! # Components
//!
//! - [`Connection`]: The contract a pending request relies on
//! - [`ConnectionFactory`]: Creates connections for an [`Authority`] on demand
//! - [`HttpConnection`]: Drives request/response exchanges over any async reader and writer
//! - [`TcpConnector`] / [`TcpConnection`]: Plain TCP connections for `http` targets

mod authority;
mod http_connection;
mod tcp;

pub use authority::Authority;
pub use http_connection::HttpConnection;
pub use tcp::TcpConnection;
pub use tcp::TcpConnector;

use std::fmt;

use tokio::sync::mpsc;

use crate::protocol::{ClientResponse, ConnectionFailure, RequestDescriptor};
use crate::request::RequestId;

/// Identifies a connection inside the client's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Progress of an exchange, reported by a connection to the client.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The request was fully written.
    Sent { id: RequestId },
    /// The complete response arrived; `keep_alive` tells whether the connection can carry
    /// another exchange.
    Response { id: RequestId, response: ClientResponse, keep_alive: bool },
    /// The exchange failed.
    Failed { id: RequestId, failure: ConnectionFailure },
}

impl ConnectionEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Sent { id } | Self::Response { id, .. } | Self::Failed { id, .. } => *id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// The contract between a pending request and its transport.
///
/// Implementations must report every request accepted by [`Connection::write`] exactly
/// once as either [`ConnectionEvent::Response`] or [`ConnectionEvent::Failed`], unless the
/// request was detached first. Failures detected while opening or writing are returned
/// instead and no event follows for them.
#[cfg_attr(test, mockall::automock)]
pub trait Connection {
    fn is_open(&self) -> bool;

    /// Starts opening the connection.
    fn open(&mut self) -> Result<(), ConnectionFailure>;

    /// Queues `request` for transmission on behalf of `id`.
    fn write(&mut self, id: RequestId, request: &RequestDescriptor) -> Result<(), ConnectionFailure>;

    /// Forgets `id`: whatever arrives for it later is discarded.
    fn detach(&mut self, id: RequestId);

    /// Whether the connection can carry another exchange.
    fn is_reusable(&self) -> bool;

    fn close(&mut self);
}

/// Creates connections for the pool.
pub trait ConnectionFactory {
    type Connection: Connection;

    fn create(&mut self, authority: &Authority, events: EventSender) -> Self::Connection;
}
