//! Builder for configuring gateway instances

use std::sync::Arc;

use super::Gateway;
use crate::cache::{CacheConfig, CacheStore, MemoryStore, SemanticResponseCache};
use crate::clock::{Clock, TokioClock};
use crate::providers::{CircuitBreakerConfig, InvocationProvider, ResilientInvoker, RetryConfig};
use crate::{MimirError, Result};

/// Main entry point for creating gateway instances.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// ```rust,ignore
/// let gateway = Mimir::builder()
///     .target("claude", Arc::new(claude))
///     .target("titan", Arc::new(titan))
///     .primary("claude")
///     .fallback("titan")
///     .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(3))
///     .build()?;
/// ```
pub struct MimirBuilder {
    targets: Vec<(String, Arc<dyn InvocationProvider>)>,
    primary: Option<String>,
    fallback: Option<String>,
    retry: RetryConfig,
    circuit: CircuitBreakerConfig,
    cache: CacheConfig,
    cache_store: Option<Arc<dyn CacheStore>>,
    cache_enabled: bool,
    clock: Option<Arc<dyn Clock>>,
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            primary: None,
            fallback: None,
            retry: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            cache_store: None,
            cache_enabled: true,
            clock: None,
        }
    }

    /// Register an invocation target under `id`.
    ///
    /// The first registered target becomes the primary unless
    /// [`primary()`](Self::primary) is called.
    pub fn target(mut self, id: impl Into<String>, provider: Arc<dyn InvocationProvider>) -> Self {
        self.targets.push((id.into(), provider));
        self
    }

    /// Set the target that serves requests first.
    pub fn primary(mut self, id: impl Into<String>) -> Self {
        self.primary = Some(id.into());
        self
    }

    /// Set the target used when the primary is exhausted or circuit-open.
    pub fn fallback(mut self, id: impl Into<String>) -> Self {
        self.fallback = Some(id.into());
        self
    }

    /// Set the retry policy (default: 3 retries, 500ms base delay, jitter).
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Set the circuit breaker policy applied to every target.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit = config;
        self
    }

    /// Configure the response cache (default: 10,000 entries, 1 hour TTL,
    /// coalescing on).
    pub fn response_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self.cache_enabled = true;
        self
    }

    /// Use a custom cache backend instead of the in-memory store.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Bypass the response cache entirely.
    pub fn disable_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Time source for cache expiry, circuit cooldowns and retry backoff.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        if self.targets.is_empty() {
            return Err(MimirError::Configuration(
                "at least one target must be registered".into(),
            ));
        }

        let primary = match self.primary {
            Some(primary) => primary,
            None => self.targets[0].0.clone(),
        };
        let is_registered = |id: &str| self.targets.iter().any(|(t, _)| t == id);
        if !is_registered(&primary) {
            return Err(MimirError::UnknownTarget(primary));
        }
        if let Some(fallback) = &self.fallback {
            if !is_registered(fallback) {
                return Err(MimirError::UnknownTarget(fallback.clone()));
            }
            if *fallback == primary {
                return Err(MimirError::Configuration(format!(
                    "fallback target '{fallback}' is the primary target"
                )));
            }
        }

        self.retry.validate()?;
        self.circuit.validate()?;
        if self.cache_enabled {
            self.cache.validate()?;
        }

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(TokioClock),
        };

        let mut invoker =
            ResilientInvoker::with_clock(self.retry, self.circuit, Arc::clone(&clock));
        for (id, provider) in self.targets {
            invoker = invoker.target(id, provider);
        }
        if let Some(fallback) = self.fallback {
            invoker = invoker.fallback(fallback);
        }

        let cache = if self.cache_enabled {
            let store: Arc<dyn CacheStore> = match self.cache_store {
                Some(store) => store,
                None => Arc::new(MemoryStore::with_max_entries(self.cache.max_entries)),
            };
            Some(SemanticResponseCache::with_store(self.cache, store, clock))
        } else {
            None
        };

        Ok(Gateway::new(primary, invoker, cache))
    }
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
