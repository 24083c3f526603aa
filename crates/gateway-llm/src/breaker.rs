//! Circuit breaker guarding the upstream dependency.
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive failures >= failure_threshold
//! Open → Half-Open:   a call is attempted after recovery_timeout (lazy, no timer)
//! Half-Open → Closed: consecutive successes >= success_threshold
//! Half-Open → Open:   any failure
//! ```
//!
//! One breaker is shared by every request to the same upstream: the failure
//! domain is the upstream, not the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// Source of monotonic time, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            success_threshold: 3,
        }
    }
}

/// Error from [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the operation.
    #[error("Circuit breaker '{name}' is open; retry in {}ms", .retry_after.as_millis())]
    Open { name: String, retry_after: Duration },
    /// The operation ran and failed; the original error is returned untouched.
    #[error(transparent)]
    Inner(E),
}

/// Serializable snapshot for monitoring and rejection payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Remaining cooldown while open; zero otherwise.
    pub retry_after_ms: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    total_calls: u64,
    total_failures: u64,
    rejected_calls: u64,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
                last_failure_at: None,
                total_calls: 0,
                total_failures: 0,
                rejected_calls: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Current state. An expired `Open` is reported as `Open` until the next
    /// call attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// While open and inside the cooldown, fails fast with
    /// [`BreakerError::Open`] without invoking `operation`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = self.execute_deferred(operation).await?;
        self.record_success();
        Ok(value)
    }

    /// Like [`execute`](Self::execute), but an `Ok` from `operation` records
    /// nothing. For calls whose outcome is only known later (a streamed
    /// body), the caller reports it with [`record_success`](Self::record_success)
    /// or [`record_failure`](Self::record_failure) once the work has finished.
    pub async fn execute_deferred<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.try_acquire() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
                retry_after,
            });
        }

        operation().await.map_err(|e| {
            self.record_failure();
            BreakerError::Inner(e)
        })
    }

    /// Admit or reject a call. On rejection returns the remaining cooldown.
    fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(Duration::MAX);
            if elapsed > self.config.recovery_timeout {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                log::info!("Circuit breaker '{}' half-open, trialing upstream", self.name);
            } else {
                inner.rejected_calls += 1;
                return Err(self.config.recovery_timeout.saturating_sub(elapsed));
            }
        }

        inner.total_calls += 1;
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.last_failure = None;
                    log::info!("Circuit breaker '{}' closed", self.name);
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    /// Count a failure. Public so failures discovered after `execute`
    /// returned (e.g. a broken response body) still reach the breaker.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;

        // A call admitted before the circuit opened failed late; the cooldown
        // keeps its original start.
        if inner.state == CircuitState::Open {
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    log::warn!(
                        "Circuit breaker '{}' opened after {} consecutive failures",
                        self.name,
                        inner.consecutive_failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                log::warn!("Circuit breaker '{}' re-opened by a half-open failure", self.name);
            }
            CircuitState::Open => {}
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let retry_after = match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(at)) => self
                .config
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(at)),
            _ => Duration::ZERO,
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_at: inner.last_failure_at,
            retry_after_ms: retry_after.as_millis() as u64,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_ms: self.config.recovery_timeout.as_millis() as u64,
        }
    }
}
