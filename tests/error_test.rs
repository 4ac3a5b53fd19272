use std::error::Error as _;
use std::time::Duration;

use mimir::{ErrorKind, MimirError, Result};

#[test]
fn test_error_display() {
    let err = MimirError::ModelNotFound("anthropic.claude-9".to_string());
    assert!(err.to_string().contains("anthropic.claude-9"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::UnknownTarget("nope".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn json_errors_convert() {
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    let err = parse().unwrap_err();
    assert!(matches!(err, MimirError::Json(_)));
    assert!(err.is_permanent());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::RateLimited { retry_after: None }.is_transient());
    assert!(MimirError::Http("connection reset".into()).is_transient());
    assert!(MimirError::Timeout(Duration::from_secs(30)).is_transient());
    assert!(MimirError::EmptyResponse.is_transient());
    for status in [408, 429, 500, 502, 503, 504] {
        let err = MimirError::Api {
            status,
            message: "x".into(),
        };
        assert!(err.is_transient(), "{status} should be transient");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}

#[test]
fn permanent_errors() {
    let permanent = [
        MimirError::AuthenticationFailed,
        MimirError::ModelNotFound("x".into()),
        MimirError::InvalidRequest("x".into()),
        MimirError::UnknownTarget("x".into()),
        MimirError::Configuration("x".into()),
        MimirError::Api {
            status: 400,
            message: "bad request".into(),
        },
        MimirError::Api {
            status: 404,
            message: "not found".into(),
        },
    ];
    for err in permanent {
        assert!(!err.is_transient(), "{err} should not be transient");
        assert!(err.is_permanent(), "{err} should be permanent");
        assert!(!err.is_unavailable());
    }
}

// ============================================================================
// Unavailability
// ============================================================================

#[test]
fn circuit_open_is_unavailable_not_permanent() {
    let err = MimirError::CircuitOpen {
        target: "primary".into(),
    };
    assert_eq!(err.kind(), ErrorKind::CircuitOpen);
    assert!(err.is_unavailable());
    assert!(!err.is_transient());
    assert!(!err.is_permanent());
    assert!(err.to_string().contains("primary"));
}

#[test]
fn unavailable_keeps_its_source() {
    let err = MimirError::Unavailable {
        target: "primary".into(),
        fallback: None,
        source: Box::new(MimirError::Timeout(Duration::from_secs(5))),
    };
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.is_unavailable());
    assert_eq!(
        err.to_string(),
        "service unavailable: target 'primary' exhausted"
    );
    let source = err.source().expect("source error");
    assert!(source.to_string().contains("timed out"));
}

#[test]
fn unavailable_names_the_fallback() {
    let err = MimirError::Unavailable {
        target: "primary".into(),
        fallback: Some("backup".into()),
        source: Box::new(MimirError::Http("reset".into())),
    };
    assert!(err.to_string().ends_with("(fallback 'backup' also failed)"));
}

#[test]
fn storage_errors_have_their_own_kind() {
    let err = MimirError::Storage("disk full".into());
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(!err.is_transient());
    assert!(!err.is_permanent());
}

// ============================================================================
// retry_after extraction
// ============================================================================

#[test]
fn retry_after_from_rate_limited() {
    let duration = Duration::from_secs(5);
    let err = MimirError::RateLimited {
        retry_after: Some(duration),
    };
    assert_eq!(err.retry_after(), Some(duration));
}

#[test]
fn retry_after_none_for_non_rate_limit_errors() {
    assert_eq!(MimirError::RateLimited { retry_after: None }.retry_after(), None);
    assert_eq!(MimirError::Http("timeout".into()).retry_after(), None);
    assert_eq!(MimirError::AuthenticationFailed.retry_after(), None);
}
