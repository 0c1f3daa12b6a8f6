//! Integration tests for building a pool from a configuration file
//!
//! These tests verify:
//! - A pool can be started from a YAML file
//! - Invalid files are rejected before a pool is built

mod common;

use common::{fleet, init_tracing, server};
use queue_pool::{ConfigurationError, ConnectionPool, PoolConfig};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Verify that a pool started from a file provisions what the file lists
#[tokio::test]
async fn test_pool_from_yaml_file() -> anyhow::Result<()> {
    init_tracing();
    let file = write_config(
        r#"
servers:
  - "qm1(1414)"
  - "qm2(1414)"
receive_queue: "APP.IN"
send_queue: "APP.OUT"
handles_per_server: 3
recovery_interval_seconds: 5
"#,
    );

    let config = PoolConfig::load(Some(file.path()))?;
    assert_eq!(config.recovery_interval(), Duration::from_secs(5));

    let transport = fleet(2);
    let pool = ConnectionPool::new(config, Arc::clone(&transport))?;
    let report = pool.initialize().await;

    assert_eq!(report.provisioned, vec![server(1), server(2)]);
    assert_eq!(pool.stats().available_receive, 6);
    assert_eq!(transport.counters(&server(2)).live_queues, 6);

    pool.shutdown().await;
    Ok(())
}

/// Verify that a file listing a server twice is rejected
#[test]
fn test_file_with_duplicate_servers_is_rejected() {
    let file = write_config(
        r#"
servers:
  - "qm1(1414)"
  - "qm1(1414)"
receive_queue: "APP.IN"
send_queue: "APP.OUT"
"#,
    );

    let error = tokio_test::assert_err!(PoolConfig::load(Some(file.path())));

    assert!(matches!(error, ConfigurationError::Invalid { .. }));
}
