//! Tests for error types.

use super::*;

fn server() -> ServerId {
    ServerId::new("qm1(1414)".to_string()).unwrap()
}

fn queue() -> QueueName {
    QueueName::new("APP.IN".to_string()).unwrap()
}

#[test]
fn test_connect_error_transience() {
    assert!(ConnectError::Unreachable {
        server: server(),
        message: "refused".to_string(),
    }
    .is_transient());

    assert!(!ConnectError::AuthenticationFailed {
        server: server(),
        message: "bad credentials".to_string(),
    }
    .is_transient());

    assert!(ConnectError::Handshake {
        server: server(),
        message: "reset".to_string(),
    }
    .is_transient());
}

#[test]
fn test_connect_error_reports_server() {
    let error = ConnectError::AuthenticationFailed {
        server: server(),
        message: "bad credentials".to_string(),
    };
    assert_eq!(error.server(), &server());
    assert_eq!(
        error.to_string(),
        "Authentication with server 'qm1(1414)' failed: bad credentials"
    );
}

#[test]
fn test_open_error_transience() {
    assert!(!OpenError::QueueNotFound { queue_name: queue() }.is_transient());
    assert!(!OpenError::AccessDenied { queue_name: queue() }.is_transient());
    assert!(OpenError::ConnectionLost {
        queue_name: queue(),
        message: "broken pipe".to_string(),
    }
    .is_transient());
}

#[test]
fn test_open_error_reports_queue() {
    let error = OpenError::AccessDenied { queue_name: queue() };
    assert_eq!(error.queue_name(), &queue());
    assert_eq!(error.to_string(), "Access denied to queue: APP.IN");
}

#[test]
fn test_lease_error_cancellation() {
    assert!(LeaseError::Canceled.is_canceled());
    assert!(LeaseError::TimedOut {
        duration: Duration::from_millis(250)
    }
    .is_canceled());
    assert!(!LeaseError::ShutDown.is_canceled());
}

#[test]
fn test_provision_error_conversions() {
    let connect = ConnectError::Unreachable {
        server: server(),
        message: "refused".to_string(),
    };
    let error: ProvisionError = connect.clone().into();
    assert_eq!(error, ProvisionError::Connect(connect));

    let open = OpenError::QueueNotFound { queue_name: queue() };
    let error: ProvisionError = open.clone().into();
    assert_eq!(error, ProvisionError::Open(open));
}

#[test]
fn test_configuration_error_wraps_validation() {
    let error: ConfigurationError = ValidationError::Required {
        field: "server".to_string(),
    }
    .into();
    assert!(matches!(error, ConfigurationError::Validation(_)));
}
