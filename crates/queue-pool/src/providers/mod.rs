//! Transport implementations.
//!
//! This module contains concrete implementations of the [`Transport`],
//! [`Connection`] and [`QueueResource`] traits.
//!
//! [`Transport`]: crate::transport::Transport
//! [`Connection`]: crate::transport::Connection
//! [`QueueResource`]: crate::transport::QueueResource

pub mod memory;

pub use memory::{
    InMemoryTransport, MemoryConnection, MemoryQueue, MemoryQueueError, ServerCounters,
};
