//! Diagnostic events emitted on provisioning and quarantine transitions.

use crate::server::ServerId;
use tracing::{info, warn};

/// Pool transitions worth surfacing to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolEvent {
    ConnectFailed,
    OpenFailed,
    Quarantined,
    Recovered,
}

impl PoolEvent {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectFailed => "connect_failed",
            Self::OpenFailed => "open_failed",
            Self::Quarantined => "quarantined",
            Self::Recovered => "recovered",
        }
    }
}

/// Emit a structured `server` / `event` / `detail` record
pub(crate) fn emit(server: &ServerId, event: PoolEvent, detail: &str) {
    match event {
        PoolEvent::Recovered => info!(
            server = %server,
            event = event.as_str(),
            detail = detail,
            "Queue server event"
        ),
        _ => warn!(
            server = %server,
            event = event.as_str(),
            detail = detail,
            "Queue server event"
        ),
    }
}
