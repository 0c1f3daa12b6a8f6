//! Collection of available handles for one direction.

use crate::handle::PooledQueue;
use crate::server::{Direction, ServerId};
use std::collections::VecDeque;

#[cfg(test)]
#[path = "handle_pool_tests.rs"]
mod tests;

/// Available handles of one direction.
///
/// Not synchronized on its own: the orchestrator keeps both pools behind the
/// same lock as the failure set, so evicting a server and quarantining it is
/// a single step for any concurrent lease.
pub(crate) struct HandlePool<Q> {
    direction: Direction,
    entries: VecDeque<PooledQueue<Q>>,
}

impl<Q> HandlePool<Q> {
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            direction,
            entries: VecDeque::new(),
        }
    }

    /// Remove one available handle
    pub(crate) fn lease(&mut self) -> Option<PooledQueue<Q>> {
        self.entries.pop_front()
    }

    /// Make a handle available.
    ///
    /// Released handles go to the back, so leases rotate across servers.
    pub(crate) fn release(&mut self, entry: PooledQueue<Q>) {
        debug_assert_eq!(entry.direction(), self.direction);
        debug_assert!(
            self.entries.iter().all(|pooled| pooled.id() != entry.id()),
            "handle pooled twice"
        );
        self.entries.push_back(entry);
    }

    /// Remove and return every handle opened on `server`
    pub(crate) fn evict_server(&mut self, server: &ServerId) -> Vec<PooledQueue<Q>> {
        let mut evicted = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.server() == server {
                evicted.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        evicted
    }

    /// Remove and return every handle
    pub(crate) fn drain(&mut self) -> Vec<PooledQueue<Q>> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of available handles opened on `server`
    pub(crate) fn count_for(&self, server: &ServerId) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.server() == server)
            .count()
    }
}
