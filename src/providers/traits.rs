//! Provider trait for invocation targets.
//!
//! A provider is one fallible, latency-variable generation endpoint: text in,
//! text out. Retry, timeouts, circuit breaking and fallback are layered on top
//! by [`ResilientInvoker`](super::ResilientInvoker); implementations should
//! only classify their errors correctly:
//!
//! - transient failures (network, throttling, 5xx) as errors for which
//!   [`MimirError::is_transient()`](crate::MimirError::is_transient) is true
//! - caller faults (validation, auth, unknown model) as permanent errors
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl InvocationProvider for Echo {
//!     fn name(&self) -> &str { "echo" }
//!
//!     async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse> {
//!         Ok(InvocationResponse::new(request.prompt.clone(), "echo"))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{InvocationRequest, InvocationResponse};

/// A generation endpoint reachable through the invoker.
#[async_trait]
pub trait InvocationProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Send one request. The invoker applies the per-attempt timeout.
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationResponse>;
}
