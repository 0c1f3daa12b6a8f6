//! Tests for server and queue identifiers.

use super::*;

mod server_id {
    use super::*;

    #[test]
    fn test_accepts_host_and_port_forms() {
        for address in ["qm1", "qm1.example.com(1414)", "10.0.0.5:1414"] {
            let server = ServerId::new(address.to_string()).unwrap();
            assert_eq!(server.as_str(), address);
            assert_eq!(server.to_string(), address);
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            ServerId::new(String::new()),
            Err(ValidationError::Required {
                field: "server".to_string()
            })
        );
    }

    #[test]
    fn test_rejects_whitespace() {
        assert!(matches!(
            ServerId::new("qm1 (1414)".to_string()),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_rejects_overlong_address() {
        assert!(matches!(
            ServerId::new("a".repeat(265)),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_and_serde_validate() {
        let parsed: ServerId = "qm2(1414)".parse().unwrap();
        assert_eq!(parsed.as_str(), "qm2(1414)");

        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, "\"qm2(1414)\"");

        let invalid: Result<ServerId, _> = serde_json::from_str("\"\"");
        assert!(invalid.is_err());
    }
}

mod queue_name {
    use super::*;

    #[test]
    fn test_accepts_queue_manager_style_names() {
        for name in ["APP.IN", "DEV.QUEUE.1", "orders_v2", "a/b%c-d"] {
            assert!(QueueName::new(name.to_string()).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_length_out_of_range() {
        assert!(matches!(
            QueueName::new(String::new()),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            QueueName::new("Q".repeat(49)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(QueueName::new("Q".repeat(48)).is_ok());
    }

    #[test]
    fn test_rejects_invalid_characters() {
        assert!(matches!(
            QueueName::new("APP IN".to_string()),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            "APP*".parse::<QueueName>(),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}

#[test]
fn test_handle_ids_are_unique() {
    let first = HandleId::new();
    let second = HandleId::new();
    assert_ne!(first, second);
}

#[test]
fn test_direction_names() {
    assert_eq!(Direction::Receive.as_str(), "receive");
    assert_eq!(Direction::Send.to_string(), "send");
    assert_eq!(
        serde_json::to_string(&Direction::Receive).unwrap(),
        "\"receive\""
    );
}

#[test]
fn test_open_mode_allows_input_and_output() {
    for direction in [Direction::Receive, Direction::Send] {
        let mode = OpenMode::for_direction(direction);
        assert!(mode.input_shared);
        assert!(mode.output);
    }
}
