//! Error types for pool operations.

use crate::server::{QueueName, ServerId};
use std::time::Duration;
use thiserror::Error;

/// Failure to establish a connection to a queue server
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Server '{server}' is unreachable: {message}")]
    Unreachable { server: ServerId, message: String },

    #[error("Authentication with server '{server}' failed: {message}")]
    AuthenticationFailed { server: ServerId, message: String },

    #[error("Handshake with server '{server}' failed: {message}")]
    Handshake { server: ServerId, message: String },
}

impl ConnectError {
    /// Server the connection attempt was made against
    pub fn server(&self) -> &ServerId {
        match self {
            Self::Unreachable { server, .. } => server,
            Self::AuthenticationFailed { server, .. } => server,
            Self::Handshake { server, .. } => server,
        }
    }

    /// Check if a later attempt could succeed without operator action
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::Handshake { .. } => true,
        }
    }
}

/// Failure to open a named queue on an established connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpenError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: QueueName },

    #[error("Access denied to queue: {queue_name}")]
    AccessDenied { queue_name: QueueName },

    #[error("Connection lost while opening queue {queue_name}: {message}")]
    ConnectionLost {
        queue_name: QueueName,
        message: String,
    },
}

impl OpenError {
    /// Queue the open attempt was made against
    pub fn queue_name(&self) -> &QueueName {
        match self {
            Self::QueueNotFound { queue_name } => queue_name,
            Self::AccessDenied { queue_name } => queue_name,
            Self::ConnectionLost { queue_name, .. } => queue_name,
        }
    }

    /// Check if a later attempt could succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }
}

/// Failure while closing a queue or disconnecting from a server.
///
/// Teardown is best effort: these errors are logged, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TeardownError {
    #[error("Failed to close queue {queue_name}: {message}")]
    Close {
        queue_name: QueueName,
        message: String,
    },

    #[error("Failed to disconnect from server '{server}': {message}")]
    Disconnect { server: ServerId, message: String },
}

/// Failure to obtain a handle from the pool
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Lease was canceled before a handle became available")]
    Canceled,

    #[error("Lease timed out after {duration:?}")]
    TimedOut { duration: Duration },

    #[error("Connection pool has been shut down")]
    ShutDown,
}

impl LeaseError {
    /// Check if the lease ended because the caller gave up waiting
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::TimedOut { .. })
    }
}

/// Failure to provision a single server
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Open failed: {0}")]
    Open(#[from] OpenError),

    #[error("Connection pool was shut down while provisioning '{server}'")]
    ShutDown { server: ServerId },

    #[error("Server '{server}' was quarantined while being provisioned")]
    Quarantined { server: ServerId },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
