//! An asynchronous micro HTTP client
//!
//! This crate manages the lifecycle of outgoing HTTP/1.1 requests on a single-threaded
//! tokio reactor: every request is tracked from submission until its handler has received
//! exactly one outcome, or until it is cancelled, and no request outlives the client that
//! owns it.
//!
//! # Example
//!
//! ```no_run
//! use http::Uri;
//! use tokio::task::LocalSet;
//! use tracing::{Level, error, info};
//! use tracing_subscriber::FmtSubscriber;
//! use micro_http_client::client::Client;
//! use micro_http_client::handler::response_channel;
//! use micro_http_client::protocol::RequestDescriptor;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     LocalSet::new()
//!         .run_until(async {
//!             let mut client = Client::new();
//!
//!             let (handler, response) = response_channel();
//!             let request = RequestDescriptor::get(Uri::from_static("http://127.0.0.1:8080/status"));
//!             if let Err(e) = client.request(request, handler) {
//!                 error!(cause = %e, "can't submit request");
//!                 return;
//!             }
//!
//!             client.run_until_idle().await;
//!             match response.await {
//!                 Ok(response) => info!(status = %response.status(), "receive response"),
//!                 Err(e) => error!(cause = %e, "request failed"),
//!             }
//!         })
//!         .await;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`client`]: The [`Client`](client::Client) registry, its connection pool and the
//!   thread-safe [`RemoteClient`](client::RemoteClient)
//! - [`request`]: The [`PendingRequest`](request::PendingRequest) state machine
//! - [`connection`]: The connection contract and the shipped TCP implementation
//! - [`handler`]: Response handler trait and adapters
//! - [`codec`]: Request encoding and response decoding
//! - [`protocol`]: Protocol types and the error taxonomy
//! - [`config`]: Client configuration
//!
//! # Error Handling
//!
//! Handlers receive a classified [`protocol::RequestError`]: `Connection` when the
//! transport could not be established, `Transport` when it broke mid-exchange, `Protocol`
//! when the response was malformed. Each carries the integer code from
//! [`protocol::code`]. Cancelled requests are not reported to their handler at all.
//!
//! # Limitations
//!
//! - HTTP/1.1 only, one exchange per connection at a time (no pipelining)
//! - No TLS support
//! - No retries and no redirects
//! - Bodies are fully buffered
//! - Maximum response head size: 8KB
//! - Maximum number of response headers: 64
//! - Maximum response body: 16MB unless configured otherwise

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod request;

mod utils;
pub(crate) use utils::ensure;
