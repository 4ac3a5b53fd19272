//! Per-target circuit breaker.
//!
//! # State machine
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ now >= opened_at + cooldown
//!     │ trial succeeds                 ▼ (on next attempt)
//!     └──────────────────────────── HalfOpen ── trial fails ──▶ Open
//! ```
//!
//! - **Closed**: attempts pass. Transient failures increment `failure_count`;
//!   a failure arriving more than `failure_window` after the previous one
//!   starts the count over. A success resets the count.
//! - **Open**: attempts are rejected with [`MimirError::CircuitOpen`] without
//!   reaching the target. The move to HalfOpen happens lazily, on the first
//!   attempt after the cooldown.
//! - **HalfOpen**: exactly one trial is admitted. Success closes the circuit,
//!   a transient failure reopens it and restarts the cooldown. A permanent
//!   error or a dropped trial frees the slot for the next caller.
//!
//! State lives behind a `std::sync::Mutex`; the lock is only held for the
//! bookkeeping, never across the provider call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::{MimirError, Result, telemetry};

/// Circuit breaker settings, shared by every target.
///
/// ```rust
/// # use mimir::CircuitBreakerConfig;
/// # use std::time::Duration;
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(3)
///     .cooldown(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit. Must be at least 1. Default: 5.
    pub failure_threshold: u32,
    /// Time an open circuit rejects calls before a trial. Default: 60s.
    pub cooldown: Duration,
    /// Failures further apart than this do not accumulate. Default: 60s.
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            failure_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with the defaults above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of failures that opens the circuit.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Set how long an open circuit rejects calls.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the window within which failures accumulate.
    pub fn failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Reject a zero threshold or a zero failure window.
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(MimirError::Configuration(
                "circuit failure_threshold must be at least 1".into(),
            ));
        }
        if self.failure_window.is_zero() {
            return Err(MimirError::Configuration(
                "circuit failure_window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Circuit status for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a target's circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub target: String,
    pub status: CircuitStatus,
    pub failure_count: u32,
    /// Time left before an open circuit admits a trial.
    pub open_remaining: Option<Duration>,
    pub trial_in_flight: bool,
}

#[derive(Debug)]
struct CircuitState {
    status: CircuitStatus,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            last_failure_at: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Circuit breaker for a single target.
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(
        target: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            state: Mutex::new(CircuitState::default()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Stored status. An open circuit whose cooldown has elapsed still reads
    /// `Open` until the next attempt moves it to `HalfOpen`.
    pub fn status(&self) -> CircuitStatus {
        self.lock().status
    }

    /// Ask to send one attempt to the target.
    ///
    /// Returns [`MimirError::CircuitOpen`] when the circuit is open within its
    /// cooldown, or half-open with the trial already taken.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>> {
        let now = self.clock.now();
        let mut state = self.lock();
        match state.status {
            CircuitStatus::Closed => Ok(CircuitPermit::new(self, false)),
            CircuitStatus::Open => {
                let ready = state
                    .opened_at
                    .is_none_or(|at| now >= at + self.config.cooldown);
                if ready {
                    self.transition(&mut state, CircuitStatus::HalfOpen);
                    state.trial_in_flight = true;
                    Ok(CircuitPermit::new(self, true))
                } else {
                    drop(state);
                    Err(self.reject())
                }
            }
            CircuitStatus::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                Ok(CircuitPermit::new(self, true))
            }
            CircuitStatus::HalfOpen => {
                drop(state);
                Err(self.reject())
            }
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        let open_remaining = match (state.status, state.opened_at) {
            (CircuitStatus::Open, Some(at)) => {
                Some((at + self.config.cooldown).saturating_duration_since(now))
            }
            _ => None,
        };
        CircuitSnapshot {
            target: self.target.clone(),
            status: state.status,
            failure_count: state.failure_count,
            open_remaining,
            trial_in_flight: state.trial_in_flight,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut state = self.lock();
        if trial {
            state.trial_in_flight = false;
            state.failure_count = 0;
            state.opened_at = None;
            self.transition(&mut state, CircuitStatus::Closed);
        } else if state.status == CircuitStatus::Closed {
            state.failure_count = 0;
        }
        // A success from an attempt admitted before the circuit opened says
        // nothing about the target now; only the trial can close it.
    }

    fn on_failure(&self, trial: bool) {
        let now = self.clock.now();
        let mut state = self.lock();

        if state.status == CircuitStatus::Closed
            && state
                .last_failure_at
                .is_some_and(|last| now.saturating_duration_since(last) > self.config.failure_window)
        {
            state.failure_count = 0;
        }
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(now);

        if trial {
            state.trial_in_flight = false;
            state.opened_at = Some(now);
            self.transition(&mut state, CircuitStatus::Open);
        } else if state.status == CircuitStatus::Closed
            && state.failure_count >= self.config.failure_threshold
        {
            state.opened_at = Some(now);
            self.transition(&mut state, CircuitStatus::Open);
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn transition(&self, state: &mut CircuitState, to: CircuitStatus) {
        let from = state.status;
        if from == to {
            return;
        }
        state.status = to;
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "target" => self.target.clone(),
            "to" => to.as_str(),
        )
        .increment(1);
        info!(
            target = %self.target,
            from = from.as_str(),
            to = to.as_str(),
            failure_count = state.failure_count,
            "circuit transition"
        );
    }

    fn reject(&self) -> MimirError {
        metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL, "target" => self.target.clone())
            .increment(1);
        MimirError::CircuitOpen {
            target: self.target.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission for one attempt, returned by [`CircuitBreaker::try_acquire`].
///
/// Settle it with [`success`](Self::success), [`failure`](Self::failure) or
/// [`record`](Self::record). Dropping an unsettled trial permit frees the
/// half-open slot without a transition.
#[must_use = "an unsettled permit records nothing"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    /// Settle from an attempt result. Only transient errors count as
    /// failures; anything else releases the permit untouched.
    pub fn record<T>(self, result: &Result<T>) {
        match result {
            Ok(_) => self.success(),
            Err(e) if e.is_transient() => self.failure(),
            Err(_) => drop(self),
        }
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

/// Lazily created circuit breakers, one per target id.
pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `target`, created Closed on first use.
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();
        if let Some(breaker) = breakers.get(target) {
            return Arc::clone(breaker);
        }
        let breaker = Arc::new(CircuitBreaker::new(
            target,
            self.config.clone(),
            Arc::clone(&self.clock),
        ));
        breakers.insert(target.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshot for `target`. Targets never called report a fresh closed
    /// circuit.
    pub fn snapshot(&self, target: &str) -> CircuitSnapshot {
        let breaker = self.lock().get(target).cloned();
        match breaker {
            Some(breaker) => breaker.snapshot(),
            None => CircuitSnapshot {
                target: target.to_string(),
                status: CircuitStatus::Closed,
                failure_count: 0,
                open_remaining: None,
                trial_in_flight: false,
            },
        }
    }

    /// Snapshots of every known circuit, sorted by target id.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers: Vec<_> = self.lock().values().cloned().collect();
        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
