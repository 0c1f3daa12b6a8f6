//! In-memory transport simulating a fleet of queue servers.
//!
//! This module provides a transport that:
//! - Hosts named FIFO queues of `Bytes` messages per server
//! - Lets tests take servers down and bring them back up
//! - Lets tests deny access to individual queues
//! - Lets tests slow down connects and teardown
//! - Counts connects, disconnects, opens and closes per server
//!
//! Taking a server down breaks every connection and queue opened on it
//! before the outage, the way a restarted queue manager invalidates its
//! clients' handles. Callers see that as a [`MemoryQueueError::Broken`] and
//! are expected to mark their handle failed.
//!
//! This transport is intended for:
//! - Unit and integration testing of the pool
//! - Development without a real queue manager

use crate::error::{ConnectError, OpenError, TeardownError, ValidationError};
use crate::server::{OpenMode, QueueName, ServerId};
use crate::transport::{Connection, QueueResource, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// All simulated servers
#[derive(Default)]
struct Fleet {
    servers: HashMap<ServerId, ServerState>,
}

/// State of one simulated server
#[derive(Default)]
struct ServerState {
    queues: HashMap<QueueName, VecDeque<Bytes>>,
    denied: HashSet<QueueName>,
    unreachable: bool,
    fail_teardown: bool,
    connect_delay: Option<Duration>,
    teardown_delay: Option<Duration>,
    /// Bumped on every outage; connections from an older epoch are broken
    epoch: u64,
    counters: ServerCounters,
}

/// Activity counters for one simulated server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCounters {
    pub connects: u64,
    pub failed_connects: u64,
    pub disconnects: u64,
    pub live_connections: u64,
    pub opens: u64,
    pub failed_opens: u64,
    pub closes: u64,
    pub live_queues: u64,
}

/// Errors from operations on an opened in-memory queue
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryQueueError {
    #[error("Connection to server '{server}' is broken")]
    Broken { server: ServerId },

    #[error("Queue {queue_name} is closed")]
    Closed { queue_name: QueueName },
}

fn lock(fleet: &Mutex<Fleet>) -> MutexGuard<'_, Fleet> {
    fleet.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a configured delay without keeping the fleet locked
fn delay_for(
    fleet: &Mutex<Fleet>,
    server: &ServerId,
    pick: impl FnOnce(&ServerState) -> Option<Duration>,
) -> Option<Duration> {
    lock(fleet).servers.get(server).and_then(pick)
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory transport. Clones share the same fleet.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    fleet: Arc<Mutex<Fleet>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server hosting the given queues
    pub fn add_server<I, S>(&self, server: &ServerId, queues: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = queues
            .into_iter()
            .map(|name| QueueName::new(name.as_ref().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fleet = lock(&self.fleet);
        let state = fleet.servers.entry(server.clone()).or_default();
        for name in names {
            state.queues.entry(name).or_default();
        }
        Ok(())
    }

    /// Take a server down or bring it back.
    ///
    /// Going down breaks every existing connection and queue on the server.
    pub fn set_reachable(&self, server: &ServerId, reachable: bool) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            if !reachable && !state.unreachable {
                state.epoch += 1;
            }
            state.unreachable = !reachable;
        }
    }

    /// Make opens of `queue` on `server` fail with access denied
    pub fn deny_queue(&self, server: &ServerId, queue: &QueueName) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            state.denied.insert(queue.clone());
        }
    }

    pub fn allow_queue(&self, server: &ServerId, queue: &QueueName) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            state.denied.remove(queue);
        }
    }

    /// Make close and disconnect on `server` report errors
    pub fn set_teardown_failures(&self, server: &ServerId, fail: bool) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            state.fail_teardown = fail;
        }
    }

    /// Delay every connect to `server`; `None` connects immediately
    pub fn set_connect_delay(&self, server: &ServerId, delay: Option<Duration>) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            state.connect_delay = delay;
        }
    }

    /// Delay every close and disconnect on `server`
    pub fn set_teardown_delay(&self, server: &ServerId, delay: Option<Duration>) {
        let mut fleet = lock(&self.fleet);
        if let Some(state) = fleet.servers.get_mut(server) {
            state.teardown_delay = delay;
        }
    }

    /// Counters for `server`; all zero for unknown servers
    pub fn counters(&self, server: &ServerId) -> ServerCounters {
        lock(&self.fleet)
            .servers
            .get(server)
            .map(|state| state.counters)
            .unwrap_or_default()
    }

    /// Number of messages waiting on a queue
    pub fn queue_depth(&self, server: &ServerId, queue: &QueueName) -> usize {
        lock(&self.fleet)
            .servers
            .get(server)
            .and_then(|state| state.queues.get(queue))
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    type Connection = MemoryConnection;
    type Queue = MemoryQueue;

    async fn connect(&self, server: &ServerId) -> Result<MemoryConnection, ConnectError> {
        let delay = delay_for(&self.fleet, server, |state| state.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut fleet = lock(&self.fleet);
        let Some(state) = fleet.servers.get_mut(server) else {
            return Err(ConnectError::Unreachable {
                server: server.clone(),
                message: "unknown server".to_string(),
            });
        };

        if state.unreachable {
            state.counters.failed_connects += 1;
            return Err(ConnectError::Unreachable {
                server: server.clone(),
                message: "server is down".to_string(),
            });
        }

        state.counters.connects += 1;
        state.counters.live_connections += 1;

        Ok(MemoryConnection {
            server: server.clone(),
            epoch: state.epoch,
            fleet: Arc::clone(&self.fleet),
            disconnected: Arc::new(AtomicBool::new(false)),
        })
    }
}

// ============================================================================
// MemoryConnection
// ============================================================================

/// Connection to one simulated server
pub struct MemoryConnection {
    server: ServerId,
    epoch: u64,
    fleet: Arc<Mutex<Fleet>>,
    disconnected: Arc<AtomicBool>,
}

impl MemoryConnection {
    pub fn server(&self) -> &ServerId {
        &self.server
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Queue = MemoryQueue;

    async fn open_queue(
        &self,
        name: &QueueName,
        _mode: OpenMode,
    ) -> Result<MemoryQueue, OpenError> {
        let mut fleet = lock(&self.fleet);
        let Some(state) = fleet.servers.get_mut(&self.server) else {
            return Err(OpenError::ConnectionLost {
                queue_name: name.clone(),
                message: "server no longer exists".to_string(),
            });
        };

        let result = if self.is_disconnected() || state.epoch != self.epoch || state.unreachable {
            Err(OpenError::ConnectionLost {
                queue_name: name.clone(),
                message: format!("connection to '{}' is broken", self.server),
            })
        } else if state.denied.contains(name) {
            Err(OpenError::AccessDenied {
                queue_name: name.clone(),
            })
        } else if !state.queues.contains_key(name) {
            Err(OpenError::QueueNotFound {
                queue_name: name.clone(),
            })
        } else {
            Ok(())
        };

        match result {
            Ok(()) => {
                state.counters.opens += 1;
                state.counters.live_queues += 1;
                Ok(MemoryQueue {
                    server: self.server.clone(),
                    name: name.clone(),
                    epoch: self.epoch,
                    fleet: Arc::clone(&self.fleet),
                    connection_closed: Arc::clone(&self.disconnected),
                    closed: false,
                })
            }
            Err(e) => {
                state.counters.failed_opens += 1;
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TeardownError> {
        if let Some(delay) = delay_for(&self.fleet, &self.server, |state| state.teardown_delay) {
            tokio::time::sleep(delay).await;
        }

        let mut fleet = lock(&self.fleet);
        let first = !self.disconnected.swap(true, Ordering::SeqCst);
        let Some(state) = fleet.servers.get_mut(&self.server) else {
            return Ok(());
        };

        state.counters.disconnects += 1;
        if first {
            state.counters.live_connections = state.counters.live_connections.saturating_sub(1);
        }

        if state.fail_teardown {
            return Err(TeardownError::Disconnect {
                server: self.server.clone(),
                message: "simulated disconnect failure".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// MemoryQueue
// ============================================================================

/// A queue opened on a simulated server
pub struct MemoryQueue {
    server: ServerId,
    name: QueueName,
    epoch: u64,
    fleet: Arc<Mutex<Fleet>>,
    connection_closed: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryQueue {
    pub fn server(&self) -> &ServerId {
        &self.server
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Append a message to the queue
    pub fn put(&self, message: Bytes) -> Result<(), MemoryQueueError> {
        self.with_queue(|queue| queue.push_back(message))
    }

    /// Take the oldest message, if any
    pub fn get(&self) -> Result<Option<Bytes>, MemoryQueueError> {
        self.with_queue(VecDeque::pop_front)
    }

    /// Number of waiting messages
    pub fn depth(&self) -> Result<usize, MemoryQueueError> {
        self.with_queue(|queue| queue.len())
    }

    fn with_queue<R>(
        &self,
        op: impl FnOnce(&mut VecDeque<Bytes>) -> R,
    ) -> Result<R, MemoryQueueError> {
        if self.closed {
            return Err(MemoryQueueError::Closed {
                queue_name: self.name.clone(),
            });
        }

        let mut fleet = lock(&self.fleet);
        let broken = || MemoryQueueError::Broken {
            server: self.server.clone(),
        };

        let state = fleet.servers.get_mut(&self.server).ok_or_else(broken)?;
        if state.unreachable
            || state.epoch != self.epoch
            || self.connection_closed.load(Ordering::SeqCst)
        {
            return Err(broken());
        }

        let queue = state.queues.get_mut(&self.name).ok_or_else(broken)?;
        Ok(op(queue))
    }
}

#[async_trait]
impl QueueResource for MemoryQueue {
    async fn close(&mut self) -> Result<(), TeardownError> {
        if self.closed {
            return Ok(());
        }
        if let Some(delay) = delay_for(&self.fleet, &self.server, |state| state.teardown_delay) {
            tokio::time::sleep(delay).await;
        }
        self.closed = true;

        let mut fleet = lock(&self.fleet);
        let Some(state) = fleet.servers.get_mut(&self.server) else {
            return Ok(());
        };

        state.counters.closes += 1;
        state.counters.live_queues = state.counters.live_queues.saturating_sub(1);

        if state.fail_teardown {
            return Err(TeardownError::Close {
                queue_name: self.name.clone(),
                message: "simulated close failure".to_string(),
            });
        }
        Ok(())
    }
}
