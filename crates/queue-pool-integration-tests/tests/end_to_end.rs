//! End-to-end lease, failure and recovery scenario
//!
//! Two servers with two receive handles each:
//! - Four leases empty the pool and further leases block
//! - Releasing one handle unblocks exactly one waiter
//! - A failed handle quarantines its server; later leases only see the other server
//! - A recovery tick brings the quarantined server back

mod common;

use common::{server, started_pool};
use queue_pool::LeaseError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_two_servers_two_handles_scenario() -> anyhow::Result<()> {
    let (pool, _transport) = started_pool(2, 2).await;
    let cancel = CancellationToken::new();

    // Four leases empty the receive pool
    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(pool.lease_receive(&cancel).await?);
    }
    assert_eq!(pool.stats().available_receive, 0);

    // Two more leasers block
    let first_waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.lease_receive(&CancellationToken::new()).await })
    };
    let second_waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.lease_receive(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!first_waiter.is_finished());
    assert!(!second_waiter.is_finished());

    // Releasing one handle unblocks exactly one of them
    let mut released = held.pop().unwrap();
    released.release().await;
    for _ in 0..100 {
        if first_waiter.is_finished() || second_waiter.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(first_waiter.is_finished() ^ second_waiter.is_finished());

    let (served, pending) = if first_waiter.is_finished() {
        (first_waiter, second_waiter)
    } else {
        (second_waiter, first_waiter)
    };
    held.push(served.await??);

    // Failing a handle from server A quarantines A
    let mut failing = held.remove(0);
    let server_a = failing.server().clone();
    let server_b = if server_a == server(1) {
        server(2)
    } else {
        server(1)
    };
    failing.mark_failed().await;
    assert!(pool.is_quarantined(&server_a));

    for mut handle in held.drain(..) {
        handle.release().await;
    }

    // Only server B serves leases until recovery
    let from_pending = pending.await??;
    assert_eq!(from_pending.server(), &server_b);
    let second_b = pool.lease_receive_timeout(Duration::from_secs(1)).await?;
    assert_eq!(second_b.server(), &server_b);

    let exhausted = pool.lease_receive_timeout(Duration::from_millis(30)).await;
    assert!(matches!(exhausted, Err(LeaseError::TimedOut { .. })));

    // A recovery tick brings A back
    assert_eq!(pool.recover_failed_servers().await, vec![server_a.clone()]);
    let recovered = pool.lease_receive_timeout(Duration::from_secs(1)).await?;
    assert_eq!(recovered.server(), &server_a);

    drop(recovered);
    drop(second_b);
    drop(from_pending);
    pool.shutdown().await;
    Ok(())
}
