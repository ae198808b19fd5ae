//! The client: registry and dispatcher of pending requests.
//!
//! # Components
//!
//! - [`Client`]: Owns every outstanding request and the connection pool, and routes
//!   connection events to the request they belong to
//! - [`RemoteClient`]: A `Send` handle that marshals requests onto the client's thread
//! - [`ConnectionPool`]: Per-authority connection reuse with a bounded number of connections
//! - [`ClientError`]: Synchronous errors of [`Client::request`]

mod error;
mod http_client;
mod pool;
mod remote;

pub use error::ClientError;
pub use http_client::Client;
pub use http_client::RequestHandle;
pub use pool::Checkout;
pub use pool::ConnectionPool;
pub use remote::RemoteClient;
