//! Connection pool orchestrator.
//!
//! [`ConnectionPool`] owns the per-server connections, the receive and send
//! handle pools and the set of quarantined servers. It provisions every
//! configured server up front, leases handles to callers, quarantines a server
//! as soon as one of its handles is marked failed, and re-provisions
//! quarantined servers from a periodic recovery job.
//!
//! # Invariants
//!
//! - A server is either provisioned (one connection, its handles pooled or
//!   leased) or quarantined (no connection, no pooled handles). Eviction of a
//!   server's handles and its insertion into the failure set happen under one
//!   lock, so no lease can observe a quarantined server's handle.
//! - The state lock is never held across an `.await`. Connecting, opening,
//!   closing and disconnecting all happen outside it.
//! - Each provisioning gets a new generation number. Handles from an older
//!   generation are closed on release instead of pooled, and their failure
//!   does not quarantine the re-provisioned server.

use crate::config::PoolConfig;
use crate::error::{ConfigurationError, LeaseError, ProvisionError};
use crate::events::{self, PoolEvent};
use crate::handle::{close_detached, HandleOwner, PooledQueue, QueueHandle};
use crate::handle_pool::HandlePool;
use crate::recovery::PeriodicJob;
use crate::registry::{FailureSet, RegisteredConnection, ServerRegistry};
use crate::server::{Direction, OpenMode, ServerId};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

const RECOVERY_JOB_NAME: &str = "queue-pool-recovery";

// ============================================================================
// Reports
// ============================================================================

/// Outcome of [`ConnectionPool::initialize`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitializeReport {
    /// Servers with a connection and a full set of handles
    pub provisioned: Vec<ServerId>,
    /// Servers that failed and are waiting for recovery
    pub quarantined: Vec<ServerId>,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub available_receive: usize,
    pub available_send: usize,
    pub connected_servers: Vec<ServerId>,
    pub quarantined_servers: Vec<(ServerId, DateTime<Utc>)>,
    pub shut_down: bool,
}

// ============================================================================
// Internal State
// ============================================================================

/// Everything guarded by the pool's single lock
struct PoolState<T: Transport> {
    receive: HandlePool<T::Queue>,
    send: HandlePool<T::Queue>,
    registry: ServerRegistry<T::Connection>,
    failed: FailureSet,
    shut_down: bool,
}

impl<T: Transport> PoolState<T> {
    fn new() -> Self {
        Self {
            receive: HandlePool::new(Direction::Receive),
            send: HandlePool::new(Direction::Send),
            registry: ServerRegistry::new(),
            failed: FailureSet::new(),
            shut_down: false,
        }
    }

    fn pool_mut(&mut self, direction: Direction) -> &mut HandlePool<T::Queue> {
        match direction {
            Direction::Receive => &mut self.receive,
            Direction::Send => &mut self.send,
        }
    }

    fn pool(&self, direction: Direction) -> &HandlePool<T::Queue> {
        match direction {
            Direction::Receive => &self.receive,
            Direction::Send => &self.send,
        }
    }

    /// Remove the server's handles from both pools
    fn evict_server(&mut self, server: &ServerId) -> Vec<PooledQueue<T::Queue>> {
        let mut evicted = self.receive.evict_server(server);
        evicted.extend(self.send.evict_server(server));
        evicted
    }

    fn is_current(&self, server: &ServerId, generation: u64) -> bool {
        !self.shut_down
            && !self.failed.contains(server)
            && self.registry.generation(server) == Some(generation)
    }
}

/// Resources detached under the lock, to be torn down after releasing it
struct Teardown<T: Transport> {
    connection: Option<RegisteredConnection<T::Connection>>,
    handles: Vec<PooledQueue<T::Queue>>,
}

struct PoolInner<T: Transport> {
    config: PoolConfig,
    transport: Arc<T>,
    state: Mutex<PoolState<T>>,
    next_generation: AtomicU64,
    initialized: AtomicBool,
    shutdown: CancellationToken,
    recovery: Mutex<Option<PeriodicJob>>,
    self_ref: Weak<PoolInner<T>>,
}

// ============================================================================
// Connection Pool
// ============================================================================

/// Pool of receive and send queue handles across a fleet of servers.
///
/// Cheap to clone; clones share the same pool.
pub struct ConnectionPool<T: Transport> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Create a pool. Does not connect to anything yet.
    pub fn new(config: PoolConfig, transport: Arc<T>) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let inner = Arc::new_cyclic(|self_ref| PoolInner {
            config,
            transport,
            state: Mutex::new(PoolState::new()),
            next_generation: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            recovery: Mutex::new(None),
            self_ref: self_ref.clone(),
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Provision every configured server and start the recovery job.
    ///
    /// Servers are provisioned concurrently. A server that cannot be
    /// connected, or on which any queue fails to open, is quarantined with
    /// nothing left open; the others are still provisioned. Only the first
    /// call provisions; later calls report the current state.
    pub async fn initialize(&self) -> InitializeReport {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            warn!("Connection pool already initialized");
            return self.inner.current_report();
        }

        let servers = self.inner.config.servers.clone();
        info!(
            servers = servers.len(),
            handles_per_server = self.inner.config.handles_per_server,
            "Initializing connection pool"
        );

        let results = join_all(
            servers
                .iter()
                .map(|server| self.inner.provision_or_quarantine(server)),
        )
        .await;

        let mut report = InitializeReport::default();
        for (server, result) in servers.into_iter().zip(results) {
            match result {
                Ok(()) => report.provisioned.push(server),
                Err(ProvisionError::ShutDown { .. }) => {}
                Err(_) => report.quarantined.push(server),
            }
        }

        self.inner.start_recovery();

        info!(
            provisioned = report.provisioned.len(),
            quarantined = report.quarantined.len(),
            "Connection pool initialized"
        );
        report
    }

    /// Lease a receive handle, waiting until one is available or `cancel` fires
    pub async fn lease_receive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        self.lease(Direction::Receive, cancel).await
    }

    /// Lease a send handle, waiting until one is available or `cancel` fires
    pub async fn lease_send(
        &self,
        cancel: &CancellationToken,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        self.lease(Direction::Send, cancel).await
    }

    pub async fn lease_receive_timeout(
        &self,
        timeout: Duration,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        self.lease_timeout(Direction::Receive, timeout).await
    }

    pub async fn lease_send_timeout(
        &self,
        timeout: Duration,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        self.lease_timeout(Direction::Send, timeout).await
    }

    /// Lease a handle of `direction`.
    ///
    /// Polls the pool every `lease_poll_interval`, yielding between polls.
    /// Waiters are not queued: whichever waiter polls first after a release
    /// gets the handle. Fails only when `cancel` fires or the pool shuts down.
    pub async fn lease(
        &self,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        let poll_interval = self.inner.config.lease_poll_interval();

        loop {
            if cancel.is_cancelled() {
                return Err(LeaseError::Canceled);
            }

            if let Some(entry) = self.inner.try_lease(direction)? {
                debug!(
                    server = %entry.server(),
                    handle_id = %entry.id(),
                    direction = %direction,
                    "Leased queue handle"
                );
                return Ok(QueueHandle::leased(entry, self.inner.owner()));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LeaseError::Canceled),
                _ = self.inner.shutdown.cancelled() => return Err(LeaseError::ShutDown),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    async fn lease_timeout(
        &self,
        direction: Direction,
        timeout: Duration,
    ) -> Result<QueueHandle<T::Queue>, LeaseError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.lease(direction, &cancel)).await {
            Ok(result) => result,
            Err(_) => Err(LeaseError::TimedOut { duration: timeout }),
        }
    }

    /// Quarantine a server: evict its handles, tear down its connection and
    /// hand it to the recovery job.
    ///
    /// Idempotent. Returns true only for the call that performed the
    /// quarantine; concurrent callers see the server already quarantined and
    /// do nothing.
    pub async fn quarantine(&self, server: &ServerId) -> bool {
        if !self.inner.config.servers.contains(server) {
            debug!(server = %server, "Ignoring quarantine of unconfigured server");
            return false;
        }
        self.inner.quarantine(server, None, "quarantined on request").await
    }

    /// Run one recovery tick now.
    ///
    /// Returns the servers that were re-provisioned. Servers that still fail
    /// stay quarantined for the next tick.
    pub async fn recover_failed_servers(&self) -> Vec<ServerId> {
        self.inner.recover_failed_servers().await
    }

    pub fn is_quarantined(&self, server: &ServerId) -> bool {
        self.inner.lock_state().failed.contains(server)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock_state().shut_down
    }

    /// Number of pooled handles of `direction` opened on `server`
    pub fn available_handles(&self, server: &ServerId, direction: Direction) -> usize {
        self.inner.lock_state().pool(direction).count_for(server)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock_state();
        PoolStats {
            available_receive: state.receive.len(),
            available_send: state.send.len(),
            connected_servers: state.registry.servers(),
            quarantined_servers: state
                .failed
                .iter()
                .map(|(server, since)| (server.clone(), *since))
                .collect(),
            shut_down: state.shut_down,
        }
    }

    /// Stop recovery and tear down every connection.
    ///
    /// Pending leases fail with [`LeaseError::ShutDown`]; handles still leased
    /// are closed when released. A recovery tick in progress is interrupted.
    /// Repeated calls are no-ops.
    pub async fn shutdown(&self) {
        let teardown = {
            let mut state = self.inner.lock_state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let mut handles = state.receive.drain();
            handles.extend(state.send.drain());
            let connections = state.registry.drain();
            let _ = state.failed.take_all();
            (handles, connections)
        };

        info!("Shutting down connection pool");
        self.inner.shutdown.cancel();

        let (handles, connections) = teardown;
        join_all(handles.into_iter().map(close_detached)).await;
        join_all(
            connections
                .into_iter()
                .map(|(server, registered)| disconnect(server, registered.connection)),
        )
        .await;

        // Cancelled above; an in-flight tick is abandoned rather than awaited
        let job = self
            .inner
            .recovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(job) = job {
            job.shutdown().await;
        }

        info!("Connection pool shut down");
    }
}

// ============================================================================
// Pool Internals
// ============================================================================

impl<T: Transport> PoolInner<T> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owner(&self) -> Weak<dyn HandleOwner<T::Queue>> {
        self.self_ref.clone()
    }

    fn try_lease(&self, direction: Direction) -> Result<Option<PooledQueue<T::Queue>>, LeaseError> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(LeaseError::ShutDown);
        }
        Ok(state.pool_mut(direction).lease())
    }

    fn current_report(&self) -> InitializeReport {
        let state = self.lock_state();
        InitializeReport {
            provisioned: state.registry.servers(),
            quarantined: state.failed.iter().map(|(server, _)| server.clone()).collect(),
        }
    }

    fn start_recovery(&self) {
        let mut slot = self.recovery.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() || self.shutdown.is_cancelled() {
            return;
        }

        let pool = self.self_ref.clone();
        let job = PeriodicJob::spawn(
            RECOVERY_JOB_NAME,
            self.config.recovery_interval(),
            self.shutdown.child_token(),
            move || {
                let pool = pool.clone();
                async move {
                    match pool.upgrade() {
                        Some(inner) => {
                            inner.recover_failed_servers().await;
                            ControlFlow::Continue(())
                        }
                        None => ControlFlow::Break(()),
                    }
                }
            },
        );
        *slot = Some(job);
    }

    /// One recovery tick: snapshot-and-clear the failure set, then provision
    /// every snapshotted server concurrently. Failures go back into the set.
    async fn recover_failed_servers(&self) -> Vec<ServerId> {
        let snapshot = {
            let mut state = self.lock_state();
            if state.shut_down {
                return Vec::new();
            }
            state.failed.take_all()
        };

        if snapshot.is_empty() {
            return Vec::new();
        }

        info!(servers = snapshot.len(), "Attempting recovery of quarantined servers");

        let results = join_all(
            snapshot
                .iter()
                .map(|server| self.provision_or_quarantine(server)),
        )
        .await;

        let mut recovered = Vec::new();
        for (server, result) in snapshot.into_iter().zip(results) {
            if result.is_ok() {
                events::emit(&server, PoolEvent::Recovered, "server re-provisioned");
                recovered.push(server);
            }
        }
        recovered
    }

    /// Provision a server, quarantining it if provisioning fails
    async fn provision_or_quarantine(&self, server: &ServerId) -> Result<(), ProvisionError> {
        let result = self.provision(server).await;
        match &result {
            Ok(()) | Err(ProvisionError::ShutDown { .. }) => {}
            Err(e) => {
                let mut state = self.lock_state();
                if !state.shut_down {
                    state.failed.insert(server.clone());
                }
                debug!(server = %server, error = %e, "Server left quarantined");
            }
        }
        result
    }

    /// Connect to a server and open its full complement of handles.
    ///
    /// Nothing is left open on failure.
    async fn provision(&self, server: &ServerId) -> Result<(), ProvisionError> {
        let connection = match self.transport.connect(server).await {
            Ok(connection) => connection,
            Err(e) => {
                events::emit(server, PoolEvent::ConnectFailed, &e.to_string());
                return Err(e.into());
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let per_server = self.config.handles_per_server;
        let mut opened = Vec::with_capacity(per_server * 2);

        for _ in 0..per_server {
            for (direction, queue_name) in [
                (Direction::Receive, &self.config.receive_queue),
                (Direction::Send, &self.config.send_queue),
            ] {
                match connection
                    .open_queue(queue_name, OpenMode::for_direction(direction))
                    .await
                {
                    Ok(queue) => opened.push(PooledQueue::new(
                        server.clone(),
                        direction,
                        generation,
                        queue,
                    )),
                    Err(e) => {
                        events::emit(server, PoolEvent::OpenFailed, &e.to_string());
                        discard(server.clone(), connection, opened).await;
                        return Err(e.into());
                    }
                }
            }
        }

        match self.commit(server, connection, generation, opened) {
            Ok(displaced) => {
                info!(
                    server = %server,
                    generation,
                    handles_per_server = per_server,
                    "Server provisioned"
                );
                self.tear_down(server, displaced).await;
                Ok(())
            }
            Err((error, connection, opened)) => {
                discard(server.clone(), connection, opened).await;
                Err(error)
            }
        }
    }

    /// Publish a provisioned server's connection and handles in one step.
    ///
    /// Hands everything back when the pool shut down or the server was
    /// quarantined while it was being provisioned.
    #[allow(clippy::type_complexity)]
    fn commit(
        &self,
        server: &ServerId,
        connection: T::Connection,
        generation: u64,
        opened: Vec<PooledQueue<T::Queue>>,
    ) -> Result<
        Teardown<T>,
        (
            ProvisionError,
            T::Connection,
            Vec<PooledQueue<T::Queue>>,
        ),
    > {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err((
                ProvisionError::ShutDown {
                    server: server.clone(),
                },
                connection,
                opened,
            ));
        }
        if state.failed.contains(server) {
            return Err((
                ProvisionError::Quarantined {
                    server: server.clone(),
                },
                connection,
                opened,
            ));
        }

        let handles = state.evict_server(server);
        let displaced = state.registry.insert(server.clone(), connection, generation);
        for entry in opened {
            state.pool_mut(entry.direction()).release(entry);
        }

        Ok(Teardown {
            connection: displaced,
            handles,
        })
    }

    /// Quarantine `server`.
    ///
    /// With a `generation`, only quarantines if the server's live connection
    /// is still that generation.
    async fn quarantine(&self, server: &ServerId, generation: Option<u64>, detail: &str) -> bool {
        let teardown = {
            let mut state = self.lock_state();
            if state.shut_down || state.failed.contains(server) {
                return false;
            }
            if let Some(generation) = generation {
                if state.registry.generation(server) != Some(generation) {
                    debug!(
                        server = %server,
                        generation,
                        "Ignoring failure of handle from a previous connection"
                    );
                    return false;
                }
            }

            let handles = state.evict_server(server);
            let connection = state.registry.remove(server);
            state.failed.insert(server.clone());
            Teardown::<T> { connection, handles }
        };

        events::emit(
            server,
            PoolEvent::Quarantined,
            &format!("{}; evicted {} pooled handles", detail, teardown.handles.len()),
        );
        self.tear_down(server, teardown).await;
        true
    }

    /// Close detached handles and disconnect a removed connection.
    ///
    /// Runs on its own task, so it completes even if the caller stops waiting.
    async fn tear_down(&self, server: &ServerId, teardown: Teardown<T>) {
        let server = server.clone();
        let task = tokio::spawn(async move {
            join_all(teardown.handles.into_iter().map(close_detached)).await;
            if let Some(registered) = teardown.connection {
                disconnect(server, registered.connection).await;
            }
        });
        if let Err(e) = task.await {
            warn!(error = %e, "Teardown task ended abnormally");
        }
    }
}

/// Close partially opened handles and drop their connection
async fn discard<C: Connection>(
    server: ServerId,
    connection: C,
    opened: Vec<PooledQueue<C::Queue>>,
) {
    join_all(opened.into_iter().map(close_detached)).await;
    disconnect(server, connection).await;
}

/// Best-effort disconnect
async fn disconnect<C: Connection>(server: ServerId, connection: C) {
    match connection.disconnect().await {
        Ok(()) => debug!(server = %server, "Disconnected from server"),
        Err(e) => warn!(server = %server, error = %e, "Failed to disconnect from server"),
    }
}

#[async_trait]
impl<T: Transport> HandleOwner<T::Queue> for PoolInner<T> {
    fn return_handle(&self, entry: PooledQueue<T::Queue>) -> Result<(), PooledQueue<T::Queue>> {
        let mut state = self.lock_state();
        if !state.is_current(entry.server(), entry.generation()) {
            debug!(
                server = %entry.server(),
                handle_id = %entry.id(),
                "Released handle is stale; closing instead of pooling"
            );
            return Err(entry);
        }

        debug!(
            server = %entry.server(),
            handle_id = %entry.id(),
            direction = %entry.direction(),
            "Returned queue handle to pool"
        );
        state.pool_mut(entry.direction()).release(entry);
        Ok(())
    }

    async fn on_handle_failed(&self, server: &ServerId, generation: u64) {
        self.quarantine(server, Some(generation), "queue handle marked failed")
            .await;
    }
}

impl<T: Transport> Drop for PoolInner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.shut_down && !state.registry.servers().is_empty() {
            warn!("Connection pool dropped without shutdown; connections were not disconnected");
        }
    }
}
