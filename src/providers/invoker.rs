//! Resilient invocation: retry, circuit breaking and fallback.
//!
//! # Call flow
//!
//! ```text
//! invoker.invoke("primary", request)
//!                 │
//!                 ▼
//!     ┌───────────────────────┐
//!     │ circuit("primary")    │ ──► Open within cooldown: skip to fallback
//!     │ retry loop            │ ──► each attempt under attempt_timeout,
//!     │                       │     outcome recorded on the circuit
//!     └───────────┬───────────┘
//!                 │ transient failures exhausted / circuit open
//!                 ▼
//!     ┌───────────────────────┐
//!     │ circuit("fallback")   │ ──► own circuit, fresh retry budget
//!     │ retry loop            │
//!     └───────────┬───────────┘
//!                 │ still failing
//!                 ▼
//!        MimirError::Unavailable
//! ```
//!
//! Permanent errors stop the flow at whichever target produced them and are
//! returned unchanged; they never touch circuit state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{instrument, warn};

use super::circuit::{CircuitBreakerConfig, CircuitRegistry, CircuitSnapshot, CircuitStatus};
use super::retry::{RetryConfig, with_retry};
use super::traits::InvocationProvider;
use crate::clock::{Clock, TokioClock};
use crate::types::{InvocationRequest, InvocationResponse};
use crate::{MimirError, Result, telemetry};

/// Invokes registered targets with retry, per-target circuit breakers and an
/// optional fallback target.
pub struct ResilientInvoker {
    targets: HashMap<String, Arc<dyn InvocationProvider>>,
    fallback: Option<String>,
    retry: RetryConfig,
    circuits: CircuitRegistry,
    clock: Arc<dyn Clock>,
}

impl ResilientInvoker {
    /// Create an invoker with no targets, using the tokio clock.
    pub fn new(retry: RetryConfig, circuit: CircuitBreakerConfig) -> Self {
        Self::with_clock(retry, circuit, Arc::new(TokioClock))
    }

    /// Create an invoker whose backoff and circuit timing read `clock`.
    pub fn with_clock(
        retry: RetryConfig,
        circuit: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets: HashMap::new(),
            fallback: None,
            retry,
            circuits: CircuitRegistry::new(circuit, Arc::clone(&clock)),
            clock,
        }
    }

    /// Register (or replace) a target.
    pub fn target(mut self, id: impl Into<String>, provider: Arc<dyn InvocationProvider>) -> Self {
        self.targets.insert(id.into(), provider);
        self
    }

    /// Route exhausted or circuit-open calls to `id`.
    pub fn fallback(mut self, id: impl Into<String>) -> Self {
        self.fallback = Some(id.into());
        self
    }

    pub fn fallback_target(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn has_target(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Registered target ids, sorted.
    pub fn target_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.targets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn circuit_snapshot(&self, target: &str) -> CircuitSnapshot {
        self.circuits.snapshot(target)
    }

    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.circuits.snapshots()
    }

    /// Invoke `target` with the configured retry policy.
    pub async fn invoke(
        &self,
        target: &str,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse> {
        self.invoke_with(target, request, &self.retry).await
    }

    /// Invoke `target` with an explicit retry policy for this call.
    #[instrument(name = "mimir.invoke", skip_all, fields(target = %target))]
    pub async fn invoke_with(
        &self,
        target: &str,
        request: &InvocationRequest,
        retry: &RetryConfig,
    ) -> Result<InvocationResponse> {
        let start = Instant::now();
        let result = self.invoke_with_fallback(target, request, retry).await;
        record_request(target, result.is_ok(), start);
        result
    }

    async fn invoke_with_fallback(
        &self,
        target: &str,
        request: &InvocationRequest,
        retry: &RetryConfig,
    ) -> Result<InvocationResponse> {
        let primary_err = match self.invoke_target(target, request, retry).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_permanent() => return Err(e),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback.as_deref().filter(|f| *f != target) else {
            return Err(match primary_err {
                e @ MimirError::CircuitOpen { .. } => e,
                e => MimirError::Unavailable {
                    target: target.to_string(),
                    fallback: None,
                    source: Box::new(e),
                },
            });
        };

        metrics::counter!(telemetry::FALLBACKS_TOTAL,
            "target" => target.to_owned(),
            "fallback" => fallback.to_owned(),
        )
        .increment(1);
        warn!(
            target,
            fallback,
            error = %primary_err,
            "primary target unavailable, trying fallback"
        );

        match self.invoke_target(fallback, request, retry).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_permanent() => Err(e),
            Err(e) => Err(MimirError::Unavailable {
                target: target.to_string(),
                fallback: Some(fallback.to_string()),
                source: Box::new(e),
            }),
        }
    }

    /// Run the retry loop against a single target.
    async fn invoke_target(
        &self,
        target: &str,
        request: &InvocationRequest,
        retry: &RetryConfig,
    ) -> Result<InvocationResponse> {
        let provider = self
            .targets
            .get(target)
            .ok_or_else(|| MimirError::UnknownTarget(target.to_string()))?;
        let breaker = self.circuits.breaker(target);
        let breaker = breaker.as_ref();
        let timeout = retry.attempt_timeout;

        // An attempt that opens the circuit ends the loop so the caller can
        // reach the fallback without sleeping a backoff first.
        let circuit_admits = || breaker.status() != CircuitStatus::Open;

        with_retry(retry, self.clock.as_ref(), target, circuit_admits, || async move {
            let permit = breaker.try_acquire()?;
            let result = match tokio::time::timeout(timeout, provider.invoke(request)).await {
                Ok(result) => result,
                Err(_) => Err(MimirError::Timeout(timeout)),
            };
            permit.record(&result);
            result.map(|mut response| {
                response.target = target.to_string();
                response
            })
        })
        .await
    }
}

fn record_request(target: &str, ok: bool, start: Instant) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "target" => target.to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "target" => target.to_owned())
        .record(start.elapsed().as_secs_f64());
}
