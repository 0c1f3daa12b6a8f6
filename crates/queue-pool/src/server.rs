//! Server and queue identifiers used throughout the pool.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Server Identifier
// ============================================================================

/// Address of a queue server, e.g. `qm1.example.com(1414)`.
///
/// Opaque to the pool: it keys the server registry and the failure set and
/// tags every handle opened against the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Create new server identifier with validation
    pub fn new(address: String) -> Result<Self, ValidationError> {
        if address.is_empty() {
            return Err(ValidationError::Required {
                field: "server".to_string(),
            });
        }

        if address.len() > 264 {
            return Err(ValidationError::OutOfRange {
                field: "server".to_string(),
                message: "maximum 264 characters".to_string(),
            });
        }

        if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::InvalidFormat {
                field: "server".to_string(),
                message: "whitespace and control characters are not allowed".to_string(),
            });
        }

        Ok(Self(address))
    }

    /// Get server address as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ServerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(value: ServerId) -> Self {
        value.0
    }
}

// ============================================================================
// Queue Name
// ============================================================================

/// Validated name of a queue hosted on every server in the fleet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 48 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-48 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '%'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric and '.', '_', '-', '/', '%' allowed"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

// ============================================================================
// Handle Identity
// ============================================================================

/// Unique identifier of one opened queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(uuid::Uuid);

impl HandleId {
    /// Generate new random handle ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two pools a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Receive,
    Send,
}

impl Direction {
    /// Get a stable lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Send => "send",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a queue is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// Open for shared input (get)
    pub input_shared: bool,
    /// Open for output (put)
    pub output: bool,
}

impl OpenMode {
    /// Mode the pool opens handles of a direction with.
    ///
    /// Both directions open input-shared plus output, so a handle from either
    /// pool can browse and put on its queue.
    pub fn for_direction(_direction: Direction) -> Self {
        Self {
            input_shared: true,
            output: true,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
