use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::client::{ClientError, RequestHandle};
use crate::connection::Authority;
use crate::handler::ResponseHandler;
use crate::protocol::RequestDescriptor;
use crate::request::RequestId;

/// Work handed to the client's thread by a [`RemoteClient`].
pub(crate) enum Command {
    Request { id: RequestId, descriptor: RequestDescriptor, handler: Box<dyn ResponseHandler + Send> },
    Cancel(RequestId),
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { id, descriptor, .. } => {
                f.debug_struct("Request").field("id", id).field("uri", descriptor.uri()).finish_non_exhaustive()
            }
            Self::Cancel(id) => f.debug_tuple("Cancel").field(id).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// A handle to a [`Client`](crate::client::Client) usable from any thread.
///
/// Calls are queued and take effect the next time the client is driven. Request ids are
/// allocated here, so the handle is returned immediately and can be cancelled before
/// the client has even seen the request.
///
/// The client itself still runs on its own thread inside a
/// [`LocalSet`](tokio::task::LocalSet):
///
/// ```no_run
/// use http::Uri;
/// use micro_http_client::client::Client;
/// use micro_http_client::handler::response_channel;
/// use micro_http_client::protocol::RequestDescriptor;
/// use tokio::task::LocalSet;
///
/// # async fn example() {
/// LocalSet::new()
///     .run_until(async {
///         let mut client = Client::new();
///         let remote = client.remote();
///
///         let worker = std::thread::spawn(move || {
///             let (handler, response) = response_channel();
///             remote.request(RequestDescriptor::get(Uri::from_static("http://127.0.0.1:8080/")), handler).unwrap();
///             response
///         });
///
///         let response = worker.join().unwrap();
///         client.run_until_idle().await;
///         println!("{:?}", response.await);
///     })
///     .await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteClient {
    ids: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<Command>,
}

impl RemoteClient {
    pub(crate) fn new(ids: Arc<AtomicU64>, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { ids, commands }
    }

    pub fn request<H>(&self, descriptor: RequestDescriptor, handler: H) -> Result<RequestHandle, ClientError>
    where
        H: ResponseHandler + Send + 'static,
    {
        Authority::from_uri(descriptor.uri())?;

        let id = RequestId::new(self.ids.fetch_add(1, Ordering::Relaxed));
        self.commands.send(Command::Request { id, descriptor, handler: Box::new(handler) }).map_err(|_closed| ClientError::Shutdown)?;
        Ok(RequestHandle::new(id))
    }

    /// Queues a cancellation; returns false when the client is gone.
    pub fn cancel(&self, handle: RequestHandle) -> bool {
        self.commands.send(Command::Cancel(handle.id())).is_ok()
    }

    pub fn shutdown(&self) {
        // a client that is already gone is shut down
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_shutdown(&self) -> bool {
        self.commands.is_closed()
    }
}
