//! Mimir - response cache and resilient invocation for foundation-model APIs
//!
//! Two layers, composed by a [`Gateway`]:
//!
//! - [`SemanticResponseCache`] normalizes a request (case and whitespace),
//!   fingerprints it with SHA-256 and serves repeats from a TTL store. Store
//!   failures never fail a request: lookups fail open, writes are logged.
//! - [`ResilientInvoker`] calls a target with per-attempt timeouts, retries
//!   transient failures with exponential backoff and jitter, and keeps a
//!   circuit breaker per target that sheds load to a fallback target.
//!
//! Matching is lexical. Two prompts that differ only in case or spacing share
//! a cache entry; paraphrases do not.
//!
//! # Concurrency
//!
//! Concurrent misses on the same key are coalesced by default: one caller
//! computes, the others wait on a per-key lock and are served the stored
//! result. Disable with [`CacheConfig::coalesce`] to let every miss reach the
//! target. No lock is held across a provider call or a backoff sleep.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mimir::{HttpProvider, InvocationRequest, Mimir, ProviderKind};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let claude = HttpProvider::new(
//!         "claude",
//!         "https://runtime.example.com",
//!         "anthropic.claude-3-haiku",
//!         ProviderKind::Anthropic,
//!     )?;
//!     let titan = HttpProvider::new(
//!         "titan",
//!         "https://runtime.example.com",
//!         "amazon.titan-text-express-v1",
//!         ProviderKind::Titan,
//!     )?;
//!
//!     let gateway = Mimir::builder()
//!         .target("claude", Arc::new(claude))
//!         .target("titan", Arc::new(titan))
//!         .primary("claude")
//!         .fallback("titan")
//!         .build()?;
//!
//!     let outcome = gateway
//!         .generate(&InvocationRequest::new("Summarize the claim in one line."))
//!         .await?;
//!     println!("{} (cached: {})", outcome.response.text, outcome.cache_hit);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{
    CacheConfig, CacheEntry, CacheKey, CacheOutcome, CacheStats, CacheStore, MemoryStore,
    NullStore, SemanticResponseCache, compose_scope, fingerprint, fingerprint_scoped,
    normalize,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{MimirConfig, TargetConfig};
pub use error::{ErrorKind, MimirError, Result};
pub use gateway::{Gateway, Mimir, MimirBuilder};
pub use providers::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitStatus, HttpProvider,
    InvocationProvider, PayloadAdapter, ProviderKind, ResilientInvoker, RetryConfig,
};
pub use types::{FinishReason, InvocationRequest, InvocationResponse, Usage};
