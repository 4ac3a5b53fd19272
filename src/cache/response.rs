//! Response cache for generation requests.
//!
//! [`SemanticResponseCache`] sits in front of the invoker. A request is
//! normalized and fingerprinted (see [`key`](super::key)); on a hit the stored
//! [`InvocationResponse`] is returned, on a miss the caller's compute closure
//! runs and its result is stored with a TTL.
//!
//! # Failure semantics
//!
//! The cache fails open. A store error during lookup is logged, counted and
//! treated as a miss; a store error during write is logged and counted, and the
//! computed response is still returned. Compute failures propagate to the
//! caller and are never stored.
//!
//! # Single-flight
//!
//! With [`CacheConfig::coalesce`] enabled (the default), concurrent misses on
//! the same key serialize on a per-key async lock. The first caller computes;
//! the others re-check the store once the lock is theirs and are served the
//! stored value. If the leader fails, the next waiter computes for itself.
//! The in-flight entry for a key is removed when its last interested caller
//! finishes or is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::{CacheEntry, CacheStore, MemoryStore};
use crate::clock::{Clock, TokioClock};
use crate::types::InvocationResponse;
use crate::{MimirError, Result, telemetry};

/// Configuration for the response cache.
///
/// Pass to [`MimirBuilder::response_cache()`](crate::MimirBuilder::response_cache)
/// to override the defaults.
///
/// ```rust
/// # use mimir::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .default_ttl(Duration::from_secs(3600))
///     .coalesce(true);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-memory store. Default: 10,000.
    pub max_entries: u64,
    /// TTL applied when a caller does not pass one. Default: 1 hour.
    pub default_ttl: Duration,
    /// Collapse concurrent misses on the same key into one computation.
    /// Default: `true`.
    pub coalesce: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: super::store::DEFAULT_MAX_ENTRIES,
            default_ttl: Duration::from_secs(3600),
            coalesce: true,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the TTL used when none is given per call.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable or disable single-flight coalescing.
    pub fn coalesce(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }

    /// Reject a zero default TTL or a zero capacity.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(MimirError::Configuration(
                "cache default TTL must be non-zero".into(),
            ));
        }
        if self.max_entries == 0 {
            return Err(MimirError::Configuration(
                "cache max_entries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`SemanticResponseCache::get_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome {
    pub response: InvocationResponse,
    /// `true` when the response came from the cache rather than this call's
    /// computation.
    pub cache_hit: bool,
}

/// Point-in-time cache counters.
///
/// `coalesced` callers are also counted in `misses`: they missed on first
/// lookup and were then served by another caller's computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub errors: u64,
    pub coalesced: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    errors: AtomicU64,
    coalesced: AtomicU64,
}

/// Per-key in-flight computation.
struct Flight {
    gate: Arc<tokio::sync::Mutex<()>>,
    interested: usize,
}

type FlightTable = Mutex<HashMap<CacheKey, Flight>>;

/// Registers interest in a key's flight; deregisters on drop, including
/// when the owning future is cancelled.
struct FlightGuard<'a> {
    table: &'a FlightTable,
    key: CacheKey,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> FlightGuard<'a> {
    fn join(table: &'a FlightTable, key: CacheKey) -> Self {
        let mut flights = lock_flights(table);
        let flight = flights.entry(key.clone()).or_insert_with(|| Flight {
            gate: Arc::default(),
            interested: 0,
        });
        flight.interested += 1;
        let gate = Arc::clone(&flight.gate);
        drop(flights);
        Self { table, key, gate }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = lock_flights(self.table);
        if let Some(flight) = flights.get_mut(&self.key) {
            flight.interested = flight.interested.saturating_sub(1);
            if flight.interested == 0 {
                flights.remove(&self.key);
            }
        }
    }
}

fn lock_flights(table: &FlightTable) -> MutexGuard<'_, HashMap<CacheKey, Flight>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fingerprint-keyed response cache with per-entry TTL.
///
/// See the module docs for failure and concurrency semantics.
pub struct SemanticResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    in_flight: FlightTable,
    counters: Counters,
}

impl SemanticResponseCache {
    /// Create a cache over a bounded in-memory store and the tokio clock.
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::with_max_entries(config.max_entries));
        Self::with_store(config, store, Arc::new(TokioClock))
    }

    /// Create a cache over an explicit store and clock.
    pub fn with_store(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the backing store.
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Look up a live entry. Expired entries and store failures are misses.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.lookup(key).await;
        match entry {
            Some(_) => self.record_hit(key),
            None => self.record_miss(key),
        }
        entry
    }

    /// Store `value` under `key` for `ttl`, overwriting any previous entry.
    ///
    /// A zero TTL stores nothing. Store failures are logged and counted.
    pub async fn put(
        &self,
        key: CacheKey,
        raw_request: &str,
        value: InvocationResponse,
        ttl: Duration,
    ) {
        if ttl.is_zero() {
            debug!(key = %key, "zero TTL, not caching");
            return;
        }
        let entry = CacheEntry::new(key, raw_request, value, self.clock.now(), ttl);
        let key = entry.key.clone();
        match self.store.store(entry).await {
            Ok(()) => {
                self.counters.stores.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "cached response");
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "put")
                    .increment(1);
                warn!(
                    key = %key,
                    store = self.store.name(),
                    error = %e,
                    "cache write failed, returning uncached response"
                );
            }
        }
    }

    /// Remove the entry for `key`, if any.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.store.remove(key).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "cache invalidate failed");
        }
    }

    /// Return the cached response for `request_text`, or run `compute` and
    /// cache its result for `ttl` (or the configured default).
    pub async fn get_or_compute<F, Fut>(
        &self,
        request_text: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InvocationResponse>>,
    {
        let key = CacheKey::derive(request_text, None);
        self.get_or_compute_keyed(key, request_text, ttl, compute)
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), with the key scoped to a
    /// target or model (and generation parameters).
    pub async fn get_or_compute_scoped<F, Fut>(
        &self,
        scope: &str,
        request_text: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InvocationResponse>>,
    {
        let key = CacheKey::derive(request_text, Some(scope));
        self.get_or_compute_keyed(key, request_text, ttl, compute)
            .await
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Number of keys with a computation in flight or queued.
    pub fn in_flight(&self) -> usize {
        lock_flights(&self.in_flight).len()
    }

    async fn get_or_compute_keyed<F, Fut>(
        &self,
        key: CacheKey,
        raw_request: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InvocationResponse>>,
    {
        if let Some(entry) = self.lookup(&key).await {
            self.record_hit(&key);
            return Ok(CacheOutcome {
                response: entry.value,
                cache_hit: true,
            });
        }
        self.record_miss(&key);

        if !self.config.coalesce {
            return self.compute_and_store(key, raw_request, ttl, compute).await;
        }

        let flight = FlightGuard::join(&self.in_flight, key.clone());
        let _turn = flight.gate.lock().await;

        if let Some(entry) = self.lookup(&key).await {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_COALESCED_TOTAL).increment(1);
            debug!(key = %key, "served by concurrent computation");
            return Ok(CacheOutcome {
                response: entry.value,
                cache_hit: true,
            });
        }

        self.compute_and_store(key, raw_request, ttl, compute).await
    }

    async fn compute_and_store<F, Fut>(
        &self,
        key: CacheKey,
        raw_request: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InvocationResponse>>,
    {
        let response = compute().await?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.put(key, raw_request, response.clone(), ttl).await;
        Ok(CacheOutcome {
            response,
            cache_hit: false,
        })
    }

    /// Load without touching hit/miss counters.
    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.load(key).await {
            Ok(Some(entry)) if !entry.is_expired(self.clock.now()) => Some(entry),
            Ok(Some(_)) => {
                debug!(key = %key, "cache entry expired");
                if let Err(e) = self.store.remove(key).await {
                    warn!(key = %key, error = %e, "failed to remove expired entry");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                warn!(
                    key = %key,
                    store = self.store.name(),
                    error = %e,
                    "cache read failed, treating as miss"
                );
                None
            }
        }
    }

    fn record_hit(&self, key: &CacheKey) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        debug!(key = %key, "cache hit");
    }

    fn record_miss(&self, key: &CacheKey) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(key = %key, "cache miss");
    }
}
