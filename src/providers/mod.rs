//! Invocation targets and the resilience layer around them.
//!
//! - [`traits::InvocationProvider`]: one fallible generation endpoint.
//! - [`adapter`]: per-family JSON payload shapes, selected by [`ProviderKind`].
//! - [`http::HttpProvider`]: reqwest-based provider.
//! - [`retry`], [`circuit`], [`invoker`]: retry with backoff, per-target
//!   circuit breakers, and the [`ResilientInvoker`] composing them with
//!   fallback routing.

pub mod adapter;
pub mod circuit;
pub mod http;
pub mod invoker;
pub mod retry;
pub mod traits;

pub use adapter::{PayloadAdapter, ProviderKind};
pub use circuit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitRegistry, CircuitSnapshot,
    CircuitStatus,
};
pub use http::HttpProvider;
pub use invoker::ResilientInvoker;
pub use retry::RetryConfig;
pub use traits::InvocationProvider;
