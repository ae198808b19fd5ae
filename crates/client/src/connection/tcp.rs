//! Plain TCP connections for `http` targets.
//!
//! Each opened [`TcpConnection`] owns a task, spawned on the current
//! [`LocalSet`](tokio::task::LocalSet), that resolves the authority, connects, and then
//! runs queued exchanges one after another through an [`HttpConnection`]. The handle and
//! its task share a small registry of attached requests: outcomes for requests that were
//! detached in the meantime are dropped instead of reported.

use std::cell::RefCell;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::net::{TcpStream, lookup_host};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::connection::{Authority, Connection, ConnectionEvent, ConnectionFactory, EventSender, HttpConnection};
use crate::protocol::{ConnectionFailure, RequestDescriptor};
use crate::request::RequestId;

/// Creates [`TcpConnection`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: Rc<ClientConfig>,
}

impl TcpConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config: Rc::new(config) }
    }
}

impl ConnectionFactory for TcpConnector {
    type Connection = TcpConnection;

    fn create(&mut self, authority: &Authority, events: EventSender) -> TcpConnection {
        TcpConnection::new(authority.clone(), Rc::clone(&self.config), events)
    }
}

#[derive(Debug, Default)]
struct Shared {
    attached: HashSet<RequestId>,
    broken: bool,
}

#[derive(Debug)]
struct Exchange {
    id: RequestId,
    request: RequestDescriptor,
}

/// A lazily opened TCP connection to one authority.
///
/// Must be opened from within a [`LocalSet`](tokio::task::LocalSet). Dropping the handle
/// aborts its task and closes the socket.
#[derive(Debug)]
pub struct TcpConnection {
    authority: Authority,
    config: Rc<ClientConfig>,
    events: EventSender,
    shared: Rc<RefCell<Shared>>,
    exchanges: Option<mpsc::UnboundedSender<Exchange>>,
    task: Option<JoinHandle<()>>,
}

impl TcpConnection {
    pub fn new(authority: Authority, config: Rc<ClientConfig>, events: EventSender) -> Self {
        Self { authority, config, events, shared: Rc::default(), exchanges: None, task: None }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl Connection for TcpConnection {
    fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts the connection task; non-`http` schemes fail without touching the network.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a [`LocalSet`](tokio::task::LocalSet).
    fn open(&mut self) -> Result<(), ConnectionFailure> {
        if self.is_open() {
            return Ok(());
        }

        if self.authority.scheme() != "http" {
            warn!(authority = %self.authority, "no transport for scheme");
            return Err(ConnectionFailure::unsupported_scheme(self.authority.scheme()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.shared = Rc::default();

        let worker = Worker {
            authority: self.authority.clone(),
            config: Rc::clone(&self.config),
            shared: Rc::clone(&self.shared),
            events: self.events.clone(),
        };

        self.task = Some(tokio::task::spawn_local(worker.run(receiver)));
        self.exchanges = Some(sender);
        debug!(authority = %self.authority, "opening connection");
        Ok(())
    }

    fn write(&mut self, id: RequestId, request: &RequestDescriptor) -> Result<(), ConnectionFailure> {
        let Some(exchanges) = &self.exchanges else {
            return Err(ConnectionFailure::Closed);
        };

        self.shared.borrow_mut().attached.insert(id);
        exchanges.send(Exchange { id, request: request.clone() }).map_err(|_| {
            self.shared.borrow_mut().attached.remove(&id);
            ConnectionFailure::Closed
        })
    }

    fn detach(&mut self, id: RequestId) {
        if self.shared.borrow_mut().attached.remove(&id) {
            trace!(request_id = %id, authority = %self.authority, "request detached");
        }
    }

    fn is_reusable(&self) -> bool {
        self.is_open() && !self.shared.borrow().broken
    }

    fn close(&mut self) {
        self.exchanges.take();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(authority = %self.authority, "connection closed");
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

struct Worker {
    authority: Authority,
    config: Rc<ClientConfig>,
    shared: Rc<RefCell<Shared>>,
    events: EventSender,
}

impl Worker {
    async fn run(self, mut exchanges: mpsc::UnboundedReceiver<Exchange>) {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(failure) => {
                warn!(authority = %self.authority, cause = %failure, "can't open connection");
                self.abandon(&mut exchanges, Some(failure));
                return;
            }
        };

        let (reader, writer) = stream.into_split();
        let mut connection = HttpConnection::with_config(reader, writer, &self.config);

        while let Some(Exchange { id, request }) = exchanges.recv().await {
            if !self.shared.borrow().attached.contains(&id) {
                trace!(request_id = %id, "skip exchange for detached request");
                continue;
            }

            if let Err(failure) = connection.send_request(&request).await {
                warn!(request_id = %id, cause = %failure, "can't send request");
                self.finish(ConnectionEvent::Failed { id, failure });
                self.abandon(&mut exchanges, None);
                return;
            }
            self.report_sent(id);

            match connection.receive_response().await {
                Ok((response, keep_alive)) => {
                    trace!(request_id = %id, status = %response.status(), keep_alive, "response received");
                    if !keep_alive {
                        self.shared.borrow_mut().broken = true;
                    }
                    self.finish(ConnectionEvent::Response { id, response, keep_alive });
                    if !keep_alive {
                        self.abandon(&mut exchanges, None);
                        return;
                    }
                }
                Err(failure) => {
                    warn!(request_id = %id, cause = %failure, "exchange failed");
                    self.shared.borrow_mut().broken = true;
                    self.finish(ConnectionEvent::Failed { id, failure });
                    self.abandon(&mut exchanges, None);
                    return;
                }
            }
        }

        debug!(authority = %self.authority, "connection handle released");
    }

    async fn connect(&self) -> Result<TcpStream, ConnectionFailure> {
        let host = self.authority.resolvable_host();
        let addrs: Vec<SocketAddr> =
            lookup_host((host, self.authority.port())).await.map_err(|e| ConnectionFailure::dns(host, e))?.collect();
        if addrs.is_empty() {
            return Err(ConnectionFailure::dns(host, "no addresses"));
        }

        let mut last_failure = None;
        for addr in addrs {
            match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%addr, cause = %e, "can't set nodelay");
                    }
                    debug!(%addr, authority = %self.authority, "connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    debug!(%addr, cause = %e, "connect attempt failed");
                    last_failure = Some(ConnectionFailure::connect(e));
                }
                Err(_) => {
                    debug!(%addr, "connect attempt timed out");
                    last_failure = Some(ConnectionFailure::timeout("connecting"));
                }
            }
        }

        Err(last_failure.unwrap_or(ConnectionFailure::Closed))
    }

    fn report_sent(&self, id: RequestId) {
        if self.shared.borrow().attached.contains(&id) {
            self.emit(ConnectionEvent::Sent { id });
        }
    }

    /// Reports the final outcome of an exchange, unless its request was detached.
    fn finish(&self, event: ConnectionEvent) {
        let id = event.request_id();
        if self.shared.borrow_mut().attached.remove(&id) {
            self.emit(event);
        } else {
            trace!(request_id = %id, "discard outcome of detached request");
        }
    }

    /// Fails every exchange still queued; the first one gets `failure` when given.
    fn abandon(&self, exchanges: &mut mpsc::UnboundedReceiver<Exchange>, mut failure: Option<ConnectionFailure>) {
        self.shared.borrow_mut().broken = true;
        exchanges.close();
        while let Ok(Exchange { id, .. }) = exchanges.try_recv() {
            let failure = failure.take().unwrap_or(ConnectionFailure::Closed);
            self.finish(ConnectionEvent::Failed { id, failure });
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events.send(event) {
            trace!(request_id = %e.0.request_id(), "client gone, drop connection event");
        }
    }
}
