//! Gateway: response cache in front of the resilient invoker.
//!
//! ```text
//! gateway.generate(request)
//!        │
//!        ▼
//!  SemanticResponseCache ── hit ──▶ cached response
//!        │ miss
//!        ▼
//!  ResilientInvoker.invoke(primary, request) ──▶ stored with TTL, returned
//! ```

mod builder;

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

pub use builder::{Mimir, MimirBuilder};

use crate::Result;
use crate::cache::{CacheOutcome, SemanticResponseCache};
use crate::config::MimirConfig;
use crate::providers::{CircuitSnapshot, HttpProvider, ResilientInvoker};
use crate::types::InvocationRequest;

/// Cached, resilient access to the configured targets.
///
/// Create with [`Mimir::builder()`] or [`Gateway::from_config()`].
pub struct Gateway {
    primary: String,
    invoker: ResilientInvoker,
    cache: Option<SemanticResponseCache>,
}

impl Gateway {
    pub(crate) fn new(
        primary: String,
        invoker: ResilientInvoker,
        cache: Option<SemanticResponseCache>,
    ) -> Self {
        Self {
            primary,
            invoker,
            cache,
        }
    }

    /// Build a gateway with an [`HttpProvider`] per configured target.
    pub fn from_config(config: &MimirConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Mimir::builder()
            .primary(&config.primary_target)
            .retry(config.retry_config())
            .circuit_breaker(config.circuit_config());

        for (id, target) in &config.targets {
            let mut provider =
                HttpProvider::new(id, &target.endpoint, &target.model, target.kind)?;
            if let Some(key) = target.api_key() {
                provider = provider.api_key(key);
            }
            builder = builder.target(id, Arc::new(provider));
        }
        if let Some(fallback) = &config.fallback_target {
            builder = builder.fallback(fallback);
        }
        builder = if config.cache.enabled {
            builder.response_cache(config.cache_config())
        } else {
            builder.disable_cache()
        };

        builder.build()
    }

    /// Generate a response, serving repeats from the cache with the default
    /// TTL.
    pub async fn generate(&self, request: &InvocationRequest) -> Result<CacheOutcome> {
        self.generate_inner(request, None).await
    }

    /// Generate a response, caching a fresh result for `ttl`.
    pub async fn generate_with_ttl(
        &self,
        request: &InvocationRequest,
        ttl: Duration,
    ) -> Result<CacheOutcome> {
        self.generate_inner(request, Some(ttl)).await
    }

    #[instrument(name = "mimir.generate", skip_all, fields(target = %self.primary))]
    async fn generate_inner(
        &self,
        request: &InvocationRequest,
        ttl: Option<Duration>,
    ) -> Result<CacheOutcome> {
        let compute = || self.invoker.invoke(&self.primary, request);
        match &self.cache {
            Some(cache) => {
                let scope = request.cache_scope(&self.primary);
                cache
                    .get_or_compute_scoped(&scope, &request.prompt, ttl, compute)
                    .await
            }
            None => Ok(CacheOutcome {
                response: compute().await?,
                cache_hit: false,
            }),
        }
    }

    pub fn primary_target(&self) -> &str {
        &self.primary
    }

    pub fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    /// The response cache, unless disabled.
    pub fn cache(&self) -> Option<&SemanticResponseCache> {
        self.cache.as_ref()
    }

    pub fn circuit_snapshot(&self, target: &str) -> CircuitSnapshot {
        self.invoker.circuit_snapshot(target)
    }
}
