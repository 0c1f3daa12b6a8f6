//! Leased queue handles.
//!
//! A [`QueueHandle`] is what callers get from a lease. It wraps one opened
//! queue and remembers the server it came from. The handle talks back to the
//! component that leased it through the [`HandleOwner`] capability: it hands
//! itself back on release and reports its server on failure.
//!
//! # Handle States
//!
//! - **Pooled**: available in a pool (or returned there by this handle)
//! - **Leased**: checked out by a caller
//! - **Discarded**: closed after a failure, an eviction or a rejected return;
//!   terminal

use crate::server::{Direction, HandleId, ServerId};
use crate::transport::QueueResource;
use async_trait::async_trait;
use std::fmt;
use std::sync::Weak;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;

// ============================================================================
// Pooled Queue
// ============================================================================

/// An opened queue together with the identity the pool tracks it by
pub struct PooledQueue<Q> {
    id: HandleId,
    server: ServerId,
    direction: Direction,
    generation: u64,
    queue: Q,
}

impl<Q> PooledQueue<Q> {
    /// Wrap a freshly opened queue
    pub fn new(server: ServerId, direction: Direction, generation: u64, queue: Q) -> Self {
        Self {
            id: HandleId::new(),
            server,
            direction,
            generation,
            queue,
        }
    }

    /// Unique id of this handle
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Server the queue was opened on
    pub fn server(&self) -> &ServerId {
        &self.server
    }

    /// Pool the queue belongs to
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Provisioning generation of the connection the queue was opened on
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Borrow the opened queue
    pub fn queue(&self) -> &Q {
        &self.queue
    }
}

/// Close a queue that no longer belongs to any pool.
///
/// Failures are logged and swallowed: the queue is being discarded anyway.
pub(crate) async fn close_detached<Q: QueueResource>(mut entry: PooledQueue<Q>) {
    match entry.queue.close().await {
        Ok(()) => debug!(
            server = %entry.server,
            handle_id = %entry.id,
            direction = %entry.direction,
            "Closed queue handle"
        ),
        Err(e) => warn!(
            server = %entry.server,
            handle_id = %entry.id,
            error = %e,
            "Failed to close queue handle"
        ),
    }
}

/// Close a detached queue from a synchronous context
fn spawn_close<Q: QueueResource>(entry: PooledQueue<Q>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(close_detached(entry));
        }
        Err(_) => warn!(
            server = %entry.server,
            handle_id = %entry.id,
            "No runtime available; queue handle dropped without close"
        ),
    }
}

// ============================================================================
// Handle Owner Capability
// ============================================================================

/// Capability a handle uses to report back to the component that leased it.
///
/// Each leased handle holds a weak reference to its owner, so a handle that
/// outlives its pool simply closes its queue.
#[async_trait]
pub trait HandleOwner<Q>: Send + Sync {
    /// Take a released handle back.
    ///
    /// Returns the entry unchanged when it can no longer be pooled, e.g. its
    /// server was quarantined or re-provisioned while it was leased. The
    /// caller then closes it.
    fn return_handle(&self, entry: PooledQueue<Q>) -> Result<(), PooledQueue<Q>>;

    /// A handle opened on `server` during provisioning `generation` failed.
    ///
    /// Implementations must withdraw the server before their first await
    /// point; callers may stop polling once the future has been polled once.
    async fn on_handle_failed(&self, server: &ServerId, generation: u64);
}

// ============================================================================
// Queue Handle
// ============================================================================

/// Lifecycle state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pooled,
    Leased,
    Discarded,
}

/// A queue handle leased from a pool.
///
/// Dropping a leased handle releases it.
pub struct QueueHandle<Q: QueueResource> {
    entry: Option<PooledQueue<Q>>,
    id: HandleId,
    server: ServerId,
    direction: Direction,
    generation: u64,
    state: HandleState,
    owner: Weak<dyn HandleOwner<Q>>,
}

impl<Q: QueueResource> QueueHandle<Q> {
    /// Check a pooled entry out to a caller
    pub(crate) fn leased(entry: PooledQueue<Q>, owner: Weak<dyn HandleOwner<Q>>) -> Self {
        Self {
            id: entry.id,
            server: entry.server.clone(),
            direction: entry.direction,
            generation: entry.generation,
            entry: Some(entry),
            state: HandleState::Leased,
            owner,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn server(&self) -> &ServerId {
        &self.server
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_leased(&self) -> bool {
        self.state == HandleState::Leased
    }

    /// The opened queue, while the handle is leased
    pub fn queue(&self) -> Option<&Q> {
        self.entry.as_ref().map(|entry| &entry.queue)
    }

    /// Mutable access to the opened queue, while the handle is leased
    pub fn queue_mut(&mut self) -> Option<&mut Q> {
        self.entry.as_mut().map(|entry| &mut entry.queue)
    }

    /// Return the handle to its pool.
    ///
    /// No-op if the handle was already released or failed. A handle whose
    /// server was quarantined or re-provisioned in the meantime is closed
    /// instead of pooled.
    pub async fn release(&mut self) {
        let Some(entry) = self.take_leased() else {
            return;
        };

        match return_to_owner(&self.owner, entry) {
            Ok(()) => self.state = HandleState::Pooled,
            Err(entry) => {
                self.state = HandleState::Discarded;
                close_detached(entry).await;
            }
        }
    }

    /// Report the handle as broken.
    ///
    /// Notifies the owner so the handle's server is quarantined, closes the
    /// queue, and leaves the handle discarded. A second call, or a call after
    /// release, is a no-op.
    ///
    /// The owner is notified on the first poll and the close runs on its own
    /// task, so abandoning the returned future neither skips the quarantine
    /// nor leaks the queue.
    pub async fn mark_failed(&mut self) {
        let Some(entry) = self.take_leased() else {
            return;
        };
        self.state = HandleState::Discarded;

        warn!(
            server = %self.server,
            handle_id = %self.id,
            direction = %self.direction,
            "Queue handle marked as failed"
        );

        let closing = tokio::spawn(close_detached(entry));

        if let Some(owner) = self.owner.upgrade() {
            owner.on_handle_failed(&self.server, self.generation).await;
        }

        if let Err(e) = closing.await {
            warn!(handle_id = %self.id, error = %e, "Queue close task ended abnormally");
        }
    }

    fn take_leased(&mut self) -> Option<PooledQueue<Q>> {
        if self.state != HandleState::Leased {
            return None;
        }
        self.entry.take()
    }
}

fn return_to_owner<Q: QueueResource>(
    owner: &Weak<dyn HandleOwner<Q>>,
    entry: PooledQueue<Q>,
) -> Result<(), PooledQueue<Q>> {
    match owner.upgrade() {
        Some(owner) => owner.return_handle(entry),
        None => Err(entry),
    }
}

impl<Q: QueueResource> Drop for QueueHandle<Q> {
    fn drop(&mut self) {
        if let Some(entry) = self.take_leased() {
            if let Err(entry) = return_to_owner(&self.owner, entry) {
                spawn_close(entry);
            }
        }
    }
}

impl<Q: QueueResource> fmt::Debug for QueueHandle<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("id", &self.id)
            .field("server", &self.server)
            .field("direction", &self.direction)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}
