//! Common test utilities for queue-pool integration tests
//!
//! This module provides:
//! - Tracing setup that routes pool logs through the test harness
//! - A simulated fleet of queue servers
//! - Pool construction helpers

use queue_pool::{ConnectionPool, InMemoryTransport, PoolConfig, QueueName, ServerId};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[allow(dead_code)]
pub const RECEIVE_QUEUE: &str = "APP.IN";
#[allow(dead_code)]
pub const SEND_QUEUE: &str = "APP.OUT";

/// Install a subscriber once per test binary. Set `RUST_LOG` to see pool logs.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn server(n: usize) -> ServerId {
    ServerId::new(format!("qm{}(1414)", n)).unwrap()
}

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

/// Simulated fleet with servers `1..=count`, each hosting both queues
#[allow(dead_code)]
pub fn fleet(count: usize) -> Arc<InMemoryTransport> {
    let transport = Arc::new(InMemoryTransport::new());
    for n in 1..=count {
        transport
            .add_server(&server(n), [RECEIVE_QUEUE, SEND_QUEUE])
            .unwrap();
    }
    transport
}

#[allow(dead_code)]
pub fn pool_config(servers: usize, handles_per_server: usize) -> PoolConfig {
    PoolConfig::new(
        (1..=servers).map(server).collect(),
        queue(RECEIVE_QUEUE),
        queue(SEND_QUEUE),
        handles_per_server,
    )
    .with_lease_poll_interval(Duration::from_millis(5))
}

/// Initialized pool over a fresh fleet
#[allow(dead_code)]
pub async fn started_pool(
    servers: usize,
    handles_per_server: usize,
) -> (ConnectionPool<InMemoryTransport>, Arc<InMemoryTransport>) {
    init_tracing();
    let transport = fleet(servers);
    let pool = ConnectionPool::new(
        pool_config(servers, handles_per_server),
        Arc::clone(&transport),
    )
    .unwrap();
    pool.initialize().await;
    (pool, transport)
}
