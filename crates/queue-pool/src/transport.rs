//! Capability traits the pool requires from a message queue transport.
//!
//! The pool never speaks a wire protocol itself. It connects, opens queues,
//! closes them and disconnects through these traits; everything a caller does
//! with a leased queue goes through the transport's own `Queue` type.

use crate::error::{ConnectError, OpenError, TeardownError};
use crate::server::{OpenMode, QueueName, ServerId};
use async_trait::async_trait;

/// Entry point of a transport: establishes connections to servers
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection type produced by this transport
    type Connection: Connection<Queue = Self::Queue>;

    /// Opened queue type handed to callers through leased handles
    type Queue: QueueResource;

    /// Connect to a single server
    async fn connect(&self, server: &ServerId) -> Result<Self::Connection, ConnectError>;
}

/// A live connection to one server
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Opened queue type
    type Queue: QueueResource;

    /// Open a named queue on this connection
    async fn open_queue(&self, name: &QueueName, mode: OpenMode)
        -> Result<Self::Queue, OpenError>;

    /// Disconnect from the server, invalidating every queue opened on it
    async fn disconnect(&self) -> Result<(), TeardownError>;
}

/// One opened queue resource
#[async_trait]
pub trait QueueResource: Send + Sync + 'static {
    /// Close the queue
    async fn close(&mut self) -> Result<(), TeardownError>;
}
