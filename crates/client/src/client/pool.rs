//! Connection reuse keyed by [`Authority`].
//!
//! Connections live in an arena indexed by [`ConnectionId`]. Per authority the pool keeps
//! the idle connections, the number of open ones, and the FIFO of requests waiting for a
//! connection once `max_per_host` is reached. A connection checked out is exclusively
//! used by one request until it is released.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use crate::connection::{Authority, Connection, ConnectionFactory, ConnectionId, EventSender};
use crate::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout {
    /// A kept-alive connection is reused.
    Idle(ConnectionId),
    /// A connection was created; it opens when the request is sent.
    New(ConnectionId),
    /// The authority is at its connection limit.
    Exhausted,
}

#[derive(Debug)]
struct Entry<C> {
    authority: Authority,
    connection: C,
}

#[derive(Debug, Default)]
struct Host {
    idle: Vec<ConnectionId>,
    open: usize,
    waiting: VecDeque<RequestId>,
}

impl Host {
    fn is_unused(&self) -> bool {
        self.open == 0 && self.waiting.is_empty()
    }
}

#[derive(Debug)]
pub struct ConnectionPool<C> {
    max_per_host: usize,
    entries: HashMap<ConnectionId, Entry<C>>,
    hosts: HashMap<Authority, Host>,
    next_id: u64,
}

impl<C: Connection> ConnectionPool<C> {
    pub fn new(max_per_host: usize) -> Self {
        Self { max_per_host: max_per_host.max(1), entries: HashMap::new(), hosts: HashMap::new(), next_id: 0 }
    }

    /// Hands out a connection to `authority`: the most recently released idle one that is
    /// still reusable, else a new one while under the limit.
    pub fn checkout<F>(&mut self, authority: &Authority, factory: &mut F, events: &EventSender) -> Checkout
    where
        F: ConnectionFactory<Connection = C>,
    {
        let host = self.hosts.entry(authority.clone()).or_default();

        while let Some(id) = host.idle.pop() {
            match self.entries.get(&id) {
                Some(entry) if entry.connection.is_reusable() => {
                    trace!(connection_id = %id, %authority, "reuse idle connection");
                    return Checkout::Idle(id);
                }
                _ => {
                    debug!(connection_id = %id, %authority, "discard stale idle connection");
                    if let Some(mut entry) = self.entries.remove(&id) {
                        entry.connection.close();
                    }
                    host.open = host.open.saturating_sub(1);
                }
            }
        }

        if host.open >= self.max_per_host {
            trace!(%authority, open = host.open, "connection limit reached");
            return Checkout::Exhausted;
        }

        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        host.open += 1;

        let connection = factory.create(authority, events.clone());
        self.entries.insert(id, Entry { authority: authority.clone(), connection });
        debug!(connection_id = %id, %authority, open = host.open, "new connection");
        Checkout::New(id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut C> {
        self.entries.get_mut(&id).map(|entry| &mut entry.connection)
    }

    pub fn authority_of(&self, id: ConnectionId) -> Option<&Authority> {
        self.entries.get(&id).map(|entry| &entry.authority)
    }

    /// Returns a checked out connection: to the idle list when `reusable` and the connection
    /// agrees, otherwise it is closed and its slot freed.
    pub fn release(&mut self, id: ConnectionId, reusable: bool) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let reusable = reusable && entry.connection.is_reusable();
        let authority = entry.authority.clone();

        let Some(host) = self.hosts.get_mut(&authority) else {
            return;
        };
        if host.idle.contains(&id) {
            return;
        }

        if reusable {
            trace!(connection_id = %id, %authority, "connection idle");
            host.idle.push(id);
            return;
        }

        if let Some(mut entry) = self.entries.remove(&id) {
            entry.connection.close();
        }
        host.open = host.open.saturating_sub(1);
        debug!(connection_id = %id, %authority, open = host.open, "connection discarded");
        if host.is_unused() {
            self.hosts.remove(&authority);
        }
    }

    /// Whether a checkout for `authority` would hand out a connection.
    pub fn has_capacity(&self, authority: &Authority) -> bool {
        self.hosts.get(authority).is_none_or(|host| !host.idle.is_empty() || host.open < self.max_per_host)
    }

    pub fn enqueue_waiting(&mut self, authority: &Authority, request: RequestId) {
        self.hosts.entry(authority.clone()).or_default().waiting.push_back(request);
    }

    pub fn has_waiting(&self, authority: &Authority) -> bool {
        self.hosts.get(authority).is_some_and(|host| !host.waiting.is_empty())
    }

    pub fn next_waiting(&mut self, authority: &Authority) -> Option<RequestId> {
        self.hosts.get_mut(authority)?.waiting.pop_front()
    }

    pub fn remove_waiting(&mut self, authority: &Authority, request: RequestId) -> bool {
        let Some(host) = self.hosts.get_mut(authority) else {
            return false;
        };
        let Some(position) = host.waiting.iter().position(|waiting| *waiting == request) else {
            return false;
        };
        host.waiting.remove(position);
        if host.is_unused() {
            self.hosts.remove(authority);
        }
        true
    }

    /// Open connections to `authority`, idle or in use.
    pub fn open_connections(&self, authority: &Authority) -> usize {
        self.hosts.get(authority).map_or(0, |host| host.open)
    }

    pub fn idle_connections(&self, authority: &Authority) -> usize {
        self.hosts.get(authority).map_or(0, |host| host.idle.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn close_all(&mut self) {
        let closed = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.connection.close();
        }
        self.hosts.clear();
        debug!(closed, "closed all connections");
    }
}
