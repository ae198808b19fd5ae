use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::client::pool::{Checkout, ConnectionPool};
use crate::client::remote::{Command, RemoteClient};
use crate::client::ClientError;
use crate::config::ClientConfig;
use crate::connection::{Authority, Connection, ConnectionEvent, ConnectionFactory, EventReceiver, EventSender, TcpConnector};
use crate::handler::ResponseHandler;
use crate::protocol::RequestDescriptor;
use crate::request::{PendingRequest, PendingState, RequestId};

/// Opaque handle of a submitted request, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(RequestId);

impl RequestHandle {
    pub(crate) fn new(id: RequestId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> RequestId {
        self.0
    }
}

/// Owner of every outstanding request and of the connections they run on.
///
/// The client lives on a single thread and is driven by awaiting
/// [`run_until_idle`](Client::run_until_idle) or [`run`](Client::run), or by calling
/// [`dispatch_ready`](Client::dispatch_ready) from an existing loop. Connections report
/// progress as events which the client routes to the owning [`PendingRequest`]; a request
/// leaves the outstanding set once its handler fired or it was cancelled.
///
/// The shipped [`TcpConnector`] spawns its connection tasks with
/// [`spawn_local`](tokio::task::spawn_local), so the client has to run inside a
/// [`LocalSet`](tokio::task::LocalSet).
///
/// ```no_run
/// use http::Uri;
/// use micro_http_client::client::Client;
/// use micro_http_client::handler::make_handler;
/// use micro_http_client::protocol::RequestDescriptor;
///
/// # async fn example() {
/// let local = tokio::task::LocalSet::new();
/// local
///     .run_until(async {
///         let mut client = Client::new();
///         let request = RequestDescriptor::get(Uri::from_static("http://127.0.0.1:8080/status"));
///         client
///             .request(request, make_handler(|result| println!("{:?}", result.map(|response| response.status()))))
///             .unwrap();
///         client.run_until_idle().await;
///     })
///     .await;
/// # }
/// ```
pub struct Client<F: ConnectionFactory = TcpConnector> {
    factory: F,
    pool: ConnectionPool<F::Connection>,
    outstanding: HashMap<RequestId, PendingRequest>,
    ids: Arc<AtomicU64>,
    events: EventSender,
    event_receiver: EventReceiver,
    commands: mpsc::UnboundedSender<Command>,
    command_receiver: mpsc::UnboundedReceiver<Command>,
    shutdown: bool,
}

impl Client<TcpConnector> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let max_connections_per_host = config.max_connections_per_host();
        Self::with_factory(max_connections_per_host, TcpConnector::new(config))
    }
}

impl Default for Client<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ConnectionFactory> Client<F> {
    /// A client creating its connections with `factory`.
    pub fn with_factory(max_connections_per_host: usize, factory: F) -> Self {
        let (events, event_receiver) = mpsc::unbounded_channel();
        let (commands, command_receiver) = mpsc::unbounded_channel();
        Self {
            factory,
            pool: ConnectionPool::new(max_connections_per_host),
            outstanding: HashMap::new(),
            ids: Arc::new(AtomicU64::new(0)),
            events,
            event_receiver,
            commands,
            command_receiver,
            shutdown: false,
        }
    }

    /// Submits a request; `handler` receives its outcome.
    ///
    /// Returns immediately. Failures of the exchange, including failing to connect, are
    /// delivered to the handler; only an unusable target or a shut down client are
    /// reported here, in which case the handler is dropped uninvoked.
    ///
    /// # Panics
    ///
    /// With the default [`TcpConnector`], panics when called outside of a
    /// [`LocalSet`](tokio::task::LocalSet), since opening a connection spawns a local task.
    pub fn request<H>(&mut self, descriptor: RequestDescriptor, handler: H) -> Result<RequestHandle, ClientError>
    where
        H: ResponseHandler + 'static,
    {
        let id = RequestId::new(self.ids.fetch_add(1, Ordering::Relaxed));
        self.submit(id, descriptor, Box::new(handler))
    }

    fn submit(&mut self, id: RequestId, descriptor: RequestDescriptor, handler: Box<dyn ResponseHandler>) -> Result<RequestHandle, ClientError> {
        if self.shutdown {
            return Err(ClientError::Shutdown);
        }

        let authority = Authority::from_uri(descriptor.uri())?;
        trace!(request_id = %id, method = %descriptor.method(), uri = %descriptor.uri(), "request submitted");

        let pending = PendingRequest::new(id, authority, descriptor, handler);
        if self.pool.has_waiting(pending.authority()) {
            self.wait_for_connection(pending);
        } else {
            self.start(pending);
        }
        Ok(RequestHandle::new(id))
    }

    fn start(&mut self, mut pending: PendingRequest) {
        let connection_id = match self.pool.checkout(pending.authority(), &mut self.factory, &self.events) {
            Checkout::Idle(id) | Checkout::New(id) => id,
            Checkout::Exhausted => {
                self.wait_for_connection(pending);
                return;
            }
        };

        let Some(connection) = self.pool.get_mut(connection_id) else {
            error!(connection_id = %connection_id, "checked out connection is missing");
            self.wait_for_connection(pending);
            return;
        };

        if let Err(e) = pending.send(connection_id, connection) {
            error!(cause = %e, "send pending request");
        }

        if pending.is_terminal() {
            // failed before reaching the wire
            self.pool.release(connection_id, false);
        } else {
            self.outstanding.insert(pending.id(), pending);
        }
    }

    fn wait_for_connection(&mut self, pending: PendingRequest) {
        debug!(request_id = %pending.id(), authority = %pending.authority(), "wait for a connection");
        self.pool.enqueue_waiting(pending.authority(), pending.id());
        self.outstanding.insert(pending.id(), pending);
    }

    /// Sends waiting requests of `authority` while connections are available.
    fn pump(&mut self, authority: &Authority) {
        while !self.shutdown && self.pool.has_capacity(authority) {
            let Some(id) = self.pool.next_waiting(authority) else {
                break;
            };
            let Some(pending) = self.outstanding.remove(&id) else {
                continue;
            };
            self.start(pending);
        }
    }

    /// Cancels an outstanding request without invoking its handler.
    ///
    /// Returns false when the request already completed, failed or was cancelled.
    pub fn cancel(&mut self, handle: RequestHandle) -> bool {
        let Some(mut pending) = self.outstanding.remove(&handle.id()) else {
            trace!(request_id = %handle.id(), "cancel of a retired request");
            return false;
        };

        match pending.connection() {
            Some(connection_id) => {
                pending.cancel(self.pool.get_mut(connection_id).map(|connection| connection as &mut dyn Connection));
                // the response may still arrive on it
                self.pool.release(connection_id, false);
            }
            None => {
                pending.cancel(None);
                self.pool.remove_waiting(pending.authority(), pending.id());
            }
        }

        self.pump(pending.authority());
        true
    }

    /// Cancels every outstanding request and closes all connections.
    ///
    /// Later requests are rejected with [`ClientError::Shutdown`]. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.shutdown {
            return;
        }
        self.shutdown = true;
        self.command_receiver.close();

        let ids: Vec<RequestId> = self.outstanding.keys().copied().collect();
        let cancelled = ids.len();
        for id in ids {
            self.cancel(RequestHandle::new(id));
        }
        self.pool.close_all();

        info!(cancelled, "client shut down");
    }

    /// Routes a connection event to its request.
    pub fn dispatch(&mut self, event: ConnectionEvent) {
        let id = event.request_id();
        let Some(pending) = self.outstanding.get_mut(&id) else {
            debug!(request_id = %id, "discard event for retired request");
            return;
        };

        let reusable = match event {
            ConnectionEvent::Sent { .. } => {
                pending.on_sent();
                return;
            }
            ConnectionEvent::Response { response, keep_alive, .. } => {
                pending.on_response(response);
                keep_alive
            }
            ConnectionEvent::Failed { failure, .. } => {
                pending.on_error(failure.code());
                false
            }
        };

        if pending.is_terminal() {
            self.retire(id, reusable);
        }
    }

    fn retire(&mut self, id: RequestId, reusable: bool) {
        let Some(pending) = self.outstanding.remove(&id) else {
            return;
        };
        if let Some(connection_id) = pending.connection() {
            self.pool.release(connection_id, reusable);
        }
        self.pump(pending.authority());
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Request { id, descriptor, handler } => {
                if let Err(e) = self.submit(id, descriptor, handler) {
                    warn!(request_id = %id, cause = %e, "reject remote request");
                }
            }
            Command::Cancel(id) => {
                self.cancel(RequestHandle::new(id));
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    /// Handles everything already queued without waiting. Returns the number of events
    /// and commands handled.
    pub fn dispatch_ready(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(event) = self.event_receiver.try_recv() {
                self.dispatch(event);
            } else if let Ok(command) = self.command_receiver.try_recv() {
                self.on_command(command);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    /// Drives the client until no request is outstanding.
    pub async fn run_until_idle(&mut self) {
        while !self.outstanding.is_empty() || !self.command_receiver.is_empty() {
            tokio::select! {
                biased;
                Some(event) = self.event_receiver.recv() => self.dispatch(event),
                Some(command) = self.command_receiver.recv() => self.on_command(command),
                else => break,
            }
        }
    }

    /// Drives the client until it is shut down, locally or through a [`RemoteClient`].
    pub async fn run(&mut self) {
        while !self.shutdown {
            tokio::select! {
                biased;
                Some(event) = self.event_receiver.recv() => self.dispatch(event),
                Some(command) = self.command_receiver.recv() => self.on_command(command),
                else => break,
            }
        }
        debug!("client stopped");
    }

    pub fn remote(&self) -> RemoteClient {
        RemoteClient::new(Arc::clone(&self.ids), self.commands.clone())
    }

    /// Number of requests neither finished nor cancelled, including those waiting for a connection.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, handle: RequestHandle) -> bool {
        self.outstanding.contains_key(&handle.id())
    }

    /// State of an outstanding request; `None` once it was retired.
    pub fn state(&self, handle: RequestHandle) -> Option<PendingState> {
        self.outstanding.get(&handle.id()).map(PendingRequest::state)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn pool(&self) -> &ConnectionPool<F::Connection> {
        &self.pool
    }
}

impl<F: ConnectionFactory> Drop for Client<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: ConnectionFactory> fmt::Debug for Client<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("outstanding", &self.outstanding.len())
            .field("connections", &self.pool.len())
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{make_handler, response_channel};
    use crate::protocol::{ClientResponse, ConnectionFailure, RequestError, code};
    use bytes::Bytes;
    use http::{Response, StatusCode, Uri};
    use std::cell::{Cell, RefCell};
    use std::io;
    use std::rc::Rc;

    type Outcome = Result<(StatusCode, Bytes), RequestError>;

    #[derive(Default, Clone)]
    struct Recorder {
        writes: Rc<RefCell<Vec<(usize, RequestId)>>>,
        detached: Rc<RefCell<Vec<RequestId>>>,
        closed: Rc<Cell<usize>>,
        created: Rc<Cell<usize>>,
        events: Rc<RefCell<Option<EventSender>>>,
    }

    struct FakeConnection {
        serial: usize,
        open: bool,
        refuse_open: bool,
        recorder: Recorder,
    }

    impl Connection for FakeConnection {
        fn is_open(&self) -> bool {
            self.open
        }

        fn open(&mut self) -> Result<(), ConnectionFailure> {
            if self.refuse_open {
                return Err(ConnectionFailure::connect(io::Error::from(io::ErrorKind::ConnectionRefused)));
            }
            self.open = true;
            Ok(())
        }

        fn write(&mut self, id: RequestId, _request: &RequestDescriptor) -> Result<(), ConnectionFailure> {
            self.recorder.writes.borrow_mut().push((self.serial, id));
            Ok(())
        }

        fn detach(&mut self, id: RequestId) {
            self.recorder.detached.borrow_mut().push(id);
        }

        fn is_reusable(&self) -> bool {
            self.open
        }

        fn close(&mut self) {
            self.open = false;
            self.recorder.closed.set(self.recorder.closed.get() + 1);
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        refuse_open: bool,
        recorder: Recorder,
    }

    impl ConnectionFactory for FakeFactory {
        type Connection = FakeConnection;

        fn create(&mut self, _authority: &Authority, events: EventSender) -> FakeConnection {
            let serial = self.recorder.created.get();
            self.recorder.created.set(serial + 1);
            *self.recorder.events.borrow_mut() = Some(events);
            FakeConnection { serial, open: false, refuse_open: self.refuse_open, recorder: self.recorder.clone() }
        }
    }

    fn client(max_connections_per_host: usize) -> (Client<FakeFactory>, Recorder) {
        let factory = FakeFactory::default();
        let recorder = factory.recorder.clone();
        (Client::with_factory(max_connections_per_host, factory), recorder)
    }

    fn recording_handler(outcomes: &Rc<RefCell<Vec<(&'static str, Outcome)>>>, name: &'static str) -> impl ResponseHandler + use<> {
        let outcomes = Rc::clone(outcomes);
        make_handler(move |result: Result<ClientResponse, RequestError>| {
            let outcome = result.map(|response| (response.status(), response.into_body()));
            outcomes.borrow_mut().push((name, outcome));
        })
    }

    fn response(status: StatusCode, body: &'static str) -> ClientResponse {
        Response::builder().status(status).body(Bytes::from_static(body.as_bytes())).unwrap()
    }

    fn get(path: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("http://localhost{path}").parse::<Uri>().unwrap())
    }

    #[test]
    fn get_status_completes() {
        let (mut client, recorder) = client(4);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let handle = client.request(get("/status"), recording_handler(&outcomes, "status")).unwrap();
        assert_eq!(client.state(handle), Some(PendingState::Sending));
        assert_eq!(*recorder.writes.borrow(), vec![(0, handle.id())]);

        client.dispatch(ConnectionEvent::Sent { id: handle.id() });
        assert_eq!(client.state(handle), Some(PendingState::AwaitingResponse));

        client.dispatch(ConnectionEvent::Response { id: handle.id(), response: response(StatusCode::OK, "OK"), keep_alive: true });

        assert_eq!(*outcomes.borrow(), vec![("status", Ok((StatusCode::OK, Bytes::from_static(b"OK"))))]);
        assert!(!client.is_outstanding(handle));
        assert_eq!(client.outstanding(), 0);
        assert_eq!(client.pool().len(), 1);
    }

    #[test]
    fn reset_reaches_handler_as_transport_error() {
        let (mut client, _recorder) = client(4);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let descriptor = RequestDescriptor::post(Uri::from_static("http://localhost/submit"), "payload");
        let handle = client.request(descriptor, recording_handler(&outcomes, "submit")).unwrap();
        client.dispatch(ConnectionEvent::Sent { id: handle.id() });
        client.dispatch(ConnectionEvent::Failed { id: handle.id(), failure: io::Error::from_raw_os_error(104).into() });

        assert_eq!(*outcomes.borrow(), vec![("submit", Err(RequestError::Transport { code: 104 }))]);
        assert_eq!(client.outstanding(), 0);
        // a failed connection is not kept
        assert!(client.pool().is_empty());

        // a late duplicate is dropped
        client.dispatch(ConnectionEvent::Response { id: handle.id(), response: response(StatusCode::OK, ""), keep_alive: true });
        assert_eq!(outcomes.borrow().len(), 1);
    }

    #[test]
    fn sequential_requests_share_a_connection_in_order() {
        let (mut client, recorder) = client(1);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let first = client.request(get("/first"), recording_handler(&outcomes, "first")).unwrap();
        let second = client.request(get("/second"), recording_handler(&outcomes, "second")).unwrap();
        assert_eq!(client.state(first), Some(PendingState::Sending));
        assert_eq!(client.state(second), Some(PendingState::Created));

        client.dispatch(ConnectionEvent::Response { id: first.id(), response: response(StatusCode::OK, "1"), keep_alive: true });
        assert_eq!(client.state(second), Some(PendingState::Sending));

        client.dispatch(ConnectionEvent::Response { id: second.id(), response: response(StatusCode::OK, "2"), keep_alive: true });

        assert_eq!(*recorder.writes.borrow(), vec![(0, first.id()), (0, second.id())]);
        assert_eq!(recorder.created.get(), 1);
        let names: Vec<_> = outcomes.borrow().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn connection_close_is_not_reused() {
        let (mut client, recorder) = client(1);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let first = client.request(get("/a"), recording_handler(&outcomes, "a")).unwrap();
        let second = client.request(get("/b"), recording_handler(&outcomes, "b")).unwrap();
        client.dispatch(ConnectionEvent::Response { id: first.id(), response: response(StatusCode::OK, ""), keep_alive: false });

        assert_eq!(*recorder.writes.borrow(), vec![(0, first.id()), (1, second.id())]);
        assert_eq!(recorder.closed.get(), 1);
    }

    #[test]
    fn shutdown_before_any_tick() {
        let (mut client, recorder) = client(4);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let handle = client.request(get("/status"), recording_handler(&outcomes, "status")).unwrap();
        client.shutdown();

        assert!(outcomes.borrow().is_empty());
        assert_eq!(client.outstanding(), 0);
        assert_eq!(*recorder.detached.borrow(), vec![handle.id()]);
        assert!(client.pool().is_empty());

        // the connection still reports, nobody listens
        client.dispatch(ConnectionEvent::Response { id: handle.id(), response: response(StatusCode::OK, "OK"), keep_alive: true });
        assert!(outcomes.borrow().is_empty());

        assert!(client.is_shutdown());
        assert_eq!(client.request(get("/late"), recording_handler(&outcomes, "late")).unwrap_err(), ClientError::Shutdown);
        client.shutdown();
    }

    #[tokio::test]
    async fn cancel_resolves_channel_as_cancelled() {
        let (mut client, recorder) = client(4);
        let (handler, response) = response_channel();

        let handle = client.request(get("/slow"), handler).unwrap();
        assert!(client.cancel(handle));
        assert!(!client.cancel(handle));

        assert_eq!(response.await.unwrap_err(), RequestError::Cancelled);
        assert_eq!(*recorder.detached.borrow(), vec![handle.id()]);
        // the in-flight exchange went away with its connection
        assert!(client.pool().is_empty());
    }

    #[test]
    fn cancel_waiting_request() {
        let (mut client, recorder) = client(1);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let first = client.request(get("/a"), recording_handler(&outcomes, "a")).unwrap();
        let second = client.request(get("/b"), recording_handler(&outcomes, "b")).unwrap();
        let third = client.request(get("/c"), recording_handler(&outcomes, "c")).unwrap();
        assert!(client.cancel(second));

        client.dispatch(ConnectionEvent::Response { id: first.id(), response: response(StatusCode::OK, ""), keep_alive: true });

        assert_eq!(*recorder.writes.borrow(), vec![(0, first.id()), (0, third.id())]);
        assert!(recorder.detached.borrow().is_empty());
        assert_eq!(client.state(third), Some(PendingState::Sending));
    }

    #[test]
    fn refused_open_fails_synchronously() {
        let factory = FakeFactory { refuse_open: true, ..FakeFactory::default() };
        let mut client = Client::with_factory(4, factory);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let handle = client.request(get("/"), recording_handler(&outcomes, "refused")).unwrap();

        assert_eq!(*outcomes.borrow(), vec![("refused", Err(RequestError::Connection { code: code::CONNECTION_REFUSED }))]);
        assert!(!client.is_outstanding(handle));
        assert!(client.pool().is_empty());
    }

    #[test]
    fn invalid_target_is_rejected() {
        let (mut client, recorder) = client(4);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let result = client.request(RequestDescriptor::get(Uri::from_static("/relative")), recording_handler(&outcomes, "x"));
        assert!(matches!(result, Err(ClientError::InvalidUri { .. })));
        assert!(outcomes.borrow().is_empty());
        assert_eq!(recorder.created.get(), 0);
    }

    #[tokio::test]
    async fn run_until_idle_drives_events() {
        let (mut client, recorder) = client(4);
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let handle = client.request(get("/status"), recording_handler(&outcomes, "status")).unwrap();
        let events = recorder.events.borrow().clone().unwrap();
        events.send(ConnectionEvent::Sent { id: handle.id() }).unwrap();
        events.send(ConnectionEvent::Response { id: handle.id(), response: response(StatusCode::OK, "OK"), keep_alive: true }).unwrap();

        client.run_until_idle().await;

        assert_eq!(outcomes.borrow().len(), 1);
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn remote_requests_run_on_the_client() {
        let (mut client, recorder) = client(4);
        let remote = client.remote();

        let (handle, future) = std::thread::spawn(move || {
            let (handler, future) = response_channel();
            let handle = remote.request(get("/remote"), handler).unwrap();
            (handle, future)
        })
        .join()
        .unwrap();

        assert_eq!(client.dispatch_ready(), 1);
        assert_eq!(*recorder.writes.borrow(), vec![(0, handle.id())]);

        client.dispatch(ConnectionEvent::Response { id: handle.id(), response: response(StatusCode::ACCEPTED, ""), keep_alive: true });
        assert_eq!(future.await.unwrap().status(), StatusCode::ACCEPTED);

        let remote = client.remote();
        remote.shutdown();
        client.run().await;
        assert!(client.is_shutdown());
        assert!(remote.is_shutdown());
    }
}
