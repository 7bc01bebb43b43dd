use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use orbitflow_expression::Environment;
use parking_lot::Mutex;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// Circuit breaker state per §4.6's `control:circuit_breaker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls short-circuit with [`EngineError::CircuitOpen`] without running the node.
    Open,
    /// A probe window: up to `max_requests` calls are allowed through to test recovery.
    HalfOpen,
}

/// Tunables for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) before tripping to open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing with a half-open trial.
    pub open_timeout: Duration,
    /// Consecutive successes (while half-open) needed to close again.
    pub success_threshold: u32,
    /// Concurrent calls allowed through during the half-open probe window.
    pub max_requests: u32,
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Shared, lock-guarded circuit breaker state machine.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    /// Creates a breaker starting in the closed state.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Returns the current state, promoting open→half-open once the
    /// timeout has elapsed.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 0;
                    inner.consecutive_successes = 0;
                }
            }
        }
        inner.state
    }

    /// Admits a call under the current state, or rejects it with
    /// [`EngineError::CircuitOpen`] when the breaker is tripped.
    pub fn try_enter(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if let Some(opened_at) = inner.opened_at {
                    if opened_at.elapsed() >= self.config.open_timeout {
                        inner.state = CircuitState::HalfOpen;
                        inner.half_open_in_flight = 0;
                        inner.consecutive_successes = 0;
                    } else {
                        return Err(EngineError::CircuitOpen);
                    }
                } else {
                    return Err(EngineError::CircuitOpen);
                }
                inner.half_open_in_flight += 1;
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.max_requests {
                    return Err(EngineError::CircuitOpen);
                }
                inner.half_open_in_flight += 1;
                Ok(())
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => {}
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                }
            }
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(failures = inner.consecutive_failures, "circuit breaker tripped open");
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }
}

/// Wraps an inner [`NodeExecutor`] with a [`CircuitBreaker`].
pub struct CircuitBroken<N> {
    inner: N,
    breaker: Arc<CircuitBreaker>,
}

impl<N> CircuitBroken<N> {
    /// Wraps `inner` with a fresh breaker tripping per `config`.
    pub fn new(inner: N, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new(config)),
        }
    }

    /// Wraps `inner` with an existing, possibly shared breaker — used to
    /// persist one breaker per name across executions.
    pub fn with_breaker(inner: N, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl<N> NodeExecutor for CircuitBroken<N>
where
    N: NodeExecutor,
{
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        self.breaker.try_enter()?;

        match self.inner.execute(ctx, config, env).await {
            Ok(output) => {
                self.breaker.record_success();
                Ok(output)
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            open_timeout: Duration::from_secs(60),
            success_threshold: 1,
            max_requests: 1,
        }
    }

    #[test]
    fn trips_open_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_enter().is_err());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config());
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
