//! Mimir error types

use std::time::Duration;

/// Coarse classification of a [`MimirError`].
///
/// Callers use this to tell "temporarily unavailable" apart from "will
/// never succeed" without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retryable: timeouts, throttling, 5xx-class failures.
    Transient,
    /// Non-retryable: validation, authentication, configuration.
    Permanent,
    /// The target's circuit is open and no fallback took the call.
    CircuitOpen,
    /// Primary and fallback were both exhausted.
    Unavailable,
    /// Cache store failure. Recovered inside the cache, never surfaced by
    /// `get_or_compute`.
    Storage,
}

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Resilience errors
    #[error("circuit open for target '{target}'")]
    CircuitOpen { target: String },

    #[error("service unavailable: target '{target}' exhausted{}", fallback_suffix(.fallback))]
    Unavailable {
        target: String,
        fallback: Option<String>,
        #[source]
        source: Box<MimirError>,
    },

    // Cache errors
    #[error("cache storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

fn fallback_suffix(fallback: &Option<String>) -> String {
    match fallback {
        Some(name) => format!(" (fallback '{name}' also failed)"),
        None => String::new(),
    }
}

impl MimirError {
    /// Whether the error is worth retrying against the same target.
    ///
    /// Transient errors also count against the target's circuit breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            MimirError::Http(_)
            | MimirError::Timeout(_)
            | MimirError::RateLimited { .. }
            | MimirError::EmptyResponse => true,
            MimirError::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// Whether the error will never succeed on retry (caller's fault or
    /// misconfiguration). Permanent errors do not affect circuit state.
    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }

    /// Whether the error means "service unavailable": the circuit refused the
    /// call or every configured target was exhausted.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CircuitOpen | ErrorKind::Unavailable
        )
    }

    /// Provider-supplied delay hint from throttling responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MimirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MimirError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            MimirError::Unavailable { .. } => ErrorKind::Unavailable,
            MimirError::Storage(_) => ErrorKind::Storage,
            e if e.is_transient() => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
