//! Integration tests for quarantine and recovery
//!
//! These tests verify:
//! - A server whose handle is marked failed drops out of rotation
//! - The recovery job brings a quarantined server back with a full set of handles
//! - Callers keep being served by healthy servers during an outage

mod common;

use bytes::Bytes;
use common::{fleet, init_tracing, pool_config, server, started_pool};
use queue_pool::{ConnectionPool, Direction};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Verify the full outage cycle: failure, quarantine, automatic recovery
#[tokio::test(start_paused = true)]
async fn test_outage_is_quarantined_then_recovered() -> anyhow::Result<()> {
    init_tracing();
    let transport = fleet(2);
    let config = pool_config(2, 2).with_recovery_interval(Duration::from_secs(60));
    let pool = ConnectionPool::new(config, Arc::clone(&transport))?;
    let report = pool.initialize().await;
    assert_eq!(report.provisioned.len(), 2);

    transport.set_reachable(&server(1), false);

    // Callers discover the outage through their own handles
    let cancel = CancellationToken::new();
    let mut failing = loop {
        let handle = pool.lease_send(&cancel).await?;
        if handle.server() == &server(1) {
            break handle;
        }
    };
    assert!(failing
        .queue()
        .unwrap()
        .put(Bytes::from_static(b"lost"))
        .is_err());
    failing.mark_failed().await;

    assert!(pool.is_quarantined(&server(1)));
    assert_eq!(pool.available_handles(&server(1), Direction::Receive), 0);

    // Healthy server keeps serving
    for _ in 0..3 {
        let handle = pool.lease_receive(&cancel).await?;
        assert_eq!(handle.server(), &server(2));
    }

    // First tick fails while the server is still down
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(pool.is_quarantined(&server(1)));

    transport.set_reachable(&server(1), true);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(!pool.is_quarantined(&server(1)));
    assert_eq!(pool.available_handles(&server(1), Direction::Receive), 2);
    assert_eq!(pool.available_handles(&server(1), Direction::Send), 2);
    assert_eq!(transport.counters(&server(1)).live_connections, 1);

    pool.shutdown().await;
    Ok(())
}

/// Verify that failures reported from many handles at once quarantine a server once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_failures_tear_down_once() -> anyhow::Result<()> {
    let (pool, transport) = started_pool(1, 4).await;
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(pool.lease_send(&cancel).await?);
    }

    let failures: Vec<_> = handles
        .into_iter()
        .map(|mut handle| tokio::spawn(async move { handle.mark_failed().await }))
        .collect();
    for failure in failures {
        failure.await?;
    }

    let counters = transport.counters(&server(1));
    assert_eq!(counters.disconnects, 1);
    assert_eq!(counters.live_queues, 0);
    assert_eq!(pool.stats().quarantined_servers.len(), 1);

    assert_eq!(pool.recover_failed_servers().await, vec![server(1)]);
    assert_eq!(pool.stats().available_send, 4);

    pool.shutdown().await;
    Ok(())
}

/// Verify that a server missing at startup joins the pool once it appears
#[tokio::test]
async fn test_server_down_at_startup_joins_later() -> anyhow::Result<()> {
    init_tracing();
    let transport = fleet(2);
    transport.set_reachable(&server(2), false);
    let pool = ConnectionPool::new(pool_config(2, 1), Arc::clone(&transport))?;

    let report = pool.initialize().await;
    assert_eq!(report.quarantined, vec![server(2)]);

    transport.set_reachable(&server(2), true);
    let recovered = pool.recover_failed_servers().await;

    assert_eq!(recovered, vec![server(2)]);
    assert_eq!(
        pool.stats().connected_servers,
        vec![server(1), server(2)]
    );

    pool.shutdown().await;
    Ok(())
}
