//! Per-server connection state and the set of quarantined servers.

use crate::server::ServerId;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// ============================================================================
// Server Registry
// ============================================================================

/// A live connection and the provisioning generation it was created in
pub(crate) struct RegisteredConnection<C> {
    pub(crate) connection: C,
    pub(crate) generation: u64,
}

/// Live connections by server. At most one per server.
pub(crate) struct ServerRegistry<C> {
    connections: HashMap<ServerId, RegisteredConnection<C>>,
}

impl<C> ServerRegistry<C> {
    pub(crate) fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Register a connection, returning the one it displaced.
    ///
    /// The caller must dispose a displaced connection.
    pub(crate) fn insert(
        &mut self,
        server: ServerId,
        connection: C,
        generation: u64,
    ) -> Option<RegisteredConnection<C>> {
        self.connections.insert(
            server,
            RegisteredConnection {
                connection,
                generation,
            },
        )
    }

    /// Remove the server's connection. Only the first caller gets it.
    pub(crate) fn remove(&mut self, server: &ServerId) -> Option<RegisteredConnection<C>> {
        self.connections.remove(server)
    }

    /// Generation of the server's live connection
    pub(crate) fn generation(&self, server: &ServerId) -> Option<u64> {
        self.connections.get(server).map(|entry| entry.generation)
    }

    pub(crate) fn servers(&self) -> Vec<ServerId> {
        let mut servers: Vec<ServerId> = self.connections.keys().cloned().collect();
        servers.sort();
        servers
    }

    /// Remove every connection
    pub(crate) fn drain(&mut self) -> Vec<(ServerId, RegisteredConnection<C>)> {
        self.connections.drain().collect()
    }
}

// ============================================================================
// Failure Set
// ============================================================================

/// Quarantined servers and when they were quarantined
#[derive(Debug, Default)]
pub(crate) struct FailureSet {
    servers: BTreeMap<ServerId, DateTime<Utc>>,
}

impl FailureSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a server; returns false if it was already quarantined
    pub(crate) fn insert(&mut self, server: ServerId) -> bool {
        if self.servers.contains_key(&server) {
            return false;
        }
        self.servers.insert(server, Utc::now());
        true
    }

    pub(crate) fn contains(&self, server: &ServerId) -> bool {
        self.servers.contains_key(server)
    }

    /// Snapshot and clear in one step
    pub(crate) fn take_all(&mut self) -> Vec<ServerId> {
        std::mem::take(&mut self.servers).into_keys().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ServerId, &DateTime<Utc>)> {
        self.servers.iter()
    }
}
