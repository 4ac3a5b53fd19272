//! Cache entries and storage backends.
//!
//! [`CacheStore`] is the seam between [`SemanticResponseCache`](super::SemanticResponseCache)
//! and where entries live. Backends only persist and return entries; expiry
//! is decided by the cache against its own clock, so a backend that returns
//! a stale entry is harmless.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::key::CacheKey;
use crate::Result;
use crate::types::InvocationResponse;

/// A stored response with its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Original request text, kept for diagnostics. Not used in lookup.
    pub raw_request: String,
    pub value: InvocationResponse,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        raw_request: impl Into<String>,
        value: InvocationResponse,
        created_at: Instant,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            raw_request: raw_request.into(),
            value,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// An entry is logically absent once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.created_at)
    }
}

/// Storage backend for cache entries.
///
/// Errors are reported, never swallowed here; the cache decides to fail
/// open.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store or overwrite the entry under `entry.key`.
    async fn store(&self, entry: CacheEntry) -> Result<()>;

    async fn remove(&self, key: &CacheKey) -> Result<()>;
}

/// Default maximum number of entries in the in-memory store.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Bounded in-memory store backed by moka.
///
/// Capacity is bounded (TinyLFU eviction), and each entry is also expired by
/// moka in the background after its own TTL. That sweep only reclaims memory;
/// read-time expiry in the cache stays authoritative.
pub struct MemoryStore {
    entries: Cache<CacheKey, CacheEntry>,
}

impl MemoryStore {
    /// Create a store with the default max capacity (10,000).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a custom max capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Approximate number of entries (moka counts lazily).
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).await)
    }

    async fn store(&self, entry: CacheEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

/// Per-entry expiry policy: every write (re)starts the entry's own TTL.
struct EntryTtl;

impl Expiry<CacheKey, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// Store that keeps nothing. Used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl CacheStore for NullStore {
    fn name(&self) -> &str {
        "null"
    }

    async fn load(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    async fn store(&self, _entry: CacheEntry) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }
}
