//! # Queue Pool
//!
//! Failure-aware pool of message queue handles spread across a fleet of queue
//! servers.
//!
//! This library provides:
//! - Pre-provisioned receive and send handles for every configured server
//! - Blocking, cancellable leases that never hand out a quarantined server's handle
//! - Quarantine of a server as soon as any of its handles is marked failed
//! - A periodic recovery job that re-provisions quarantined servers
//!
//! ## Module Organization
//!
//! - [error] - Error types for connect, open, lease and configuration failures
//! - [server] - Server and queue identifiers, handle directions
//! - [config] - Pool configuration and loading
//! - [transport] - Capability traits the pool drives
//! - [providers] - Transport implementations (in-memory)
//! - [handle] - Leased queue handles and the owner capability
//! - [pool] - The connection pool orchestrator
//! - [recovery] - Cancellable periodic job used for recovery
//!
//! ## Usage
//!
//! ```rust
//! use queue_pool::{ConnectionPool, InMemoryTransport, PoolConfig, QueueName, ServerId};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let server = ServerId::new("qm1(1414)".to_string())?;
//! let transport = Arc::new(InMemoryTransport::new());
//! transport.add_server(&server, ["APP.IN", "APP.OUT"])?;
//!
//! let config = PoolConfig::new(
//!     vec![server],
//!     QueueName::new("APP.IN".to_string())?,
//!     QueueName::new("APP.OUT".to_string())?,
//!     2,
//! );
//! let pool = ConnectionPool::new(config, transport)?;
//! pool.initialize().await;
//!
//! let mut handle = pool.lease_send(&CancellationToken::new()).await?;
//! if let Some(queue) = handle.queue() {
//!     queue.put("hello".into())?;
//! }
//! handle.release().await;
//!
//! pool.shutdown().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod handle;
pub mod pool;
pub mod providers;
pub mod recovery;
pub mod server;
pub mod transport;

mod events;
mod handle_pool;
mod registry;

// Re-export commonly used types at crate root for convenience
pub use config::PoolConfig;
pub use error::{
    ConfigurationError, ConnectError, LeaseError, OpenError, ProvisionError, TeardownError,
    ValidationError,
};
pub use handle::{HandleOwner, HandleState, PooledQueue, QueueHandle};
pub use pool::{ConnectionPool, InitializeReport, PoolStats};
pub use providers::{
    InMemoryTransport, MemoryConnection, MemoryQueue, MemoryQueueError, ServerCounters,
};
pub use recovery::PeriodicJob;
pub use server::{Direction, HandleId, OpenMode, QueueName, ServerId};
pub use transport::{Connection, QueueResource, Transport};
