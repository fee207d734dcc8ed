use std::time::Duration;

use mimir::{MimirError, Result};

#[test]
fn test_error_display() {
    let err = MimirError::Api {
        status: 503,
        message: "overloaded".to_string(),
    };
    assert_eq!(err.to_string(), "API error (503): overloaded");

    let err = MimirError::AllChunksFailed {
        chunks: 4,
        last_error: "network error: reset".to_string(),
    };
    assert!(err.to_string().contains("all 4 chunks failed"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::Configuration("no key".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn test_json_error_conversion() {
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    assert!(matches!(parse(), Err(MimirError::Json(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::RateLimited { retry_after: None }.is_transient());
    assert!(MimirError::TransientNetwork("reset".into()).is_transient());
    assert!(MimirError::MalformedResponse("empty".into()).is_transient());
    assert!(
        MimirError::Api {
            status: 500,
            message: "x".into()
        }
        .is_transient()
    );
}

#[test]
fn permanent_errors() {
    assert!(!MimirError::PayloadTooLarge("413".into()).is_transient());
    assert!(!MimirError::Configuration("no key".into()).is_transient());
    assert!(
        !MimirError::AllChunksFailed {
            chunks: 1,
            last_error: String::new()
        }
        .is_transient()
    );
}

#[test]
fn retry_after_only_from_rate_limits() {
    let err = MimirError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    assert_eq!(MimirError::TransientNetwork("x".into()).retry_after(), None);
}
