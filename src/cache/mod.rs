//! Caching subsystem.
//!
//! - [`key`]: request normalization and SHA-256 fingerprinting.
//!
//! - [`store`]: the [`CacheStore`] backend trait, the bounded in-memory
//!   [`MemoryStore`] (moka) and the no-op [`NullStore`].
//!
//! - [`response`]: [`SemanticResponseCache`], the TTL cache the gateway puts
//!   in front of the invoker. Fails open on store errors and coalesces
//!   concurrent misses by default. See [`response`] module docs.

pub mod key;
pub mod response;
pub mod store;

pub use key::{CacheKey, compose_scope, fingerprint, fingerprint_scoped, normalize};
pub use response::{CacheConfig, CacheOutcome, CacheStats, SemanticResponseCache};
pub use store::{CacheEntry, CacheStore, MemoryStore, NullStore};
