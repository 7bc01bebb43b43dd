use std::time::Duration;

use async_trait::async_trait;
use orbitflow_expression::Environment;
use rand::Rng;
use serde_json::Value;

use crate::context::{Cancellation, NodeContext};
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Every attempt waits `initial_delay_ms`.
    Fixed,
    /// Attempt `n` waits `initial_delay_ms * multiplier^(n-1)`, capped at `max_delay_ms`.
    Exponential,
    /// Exponential, with the resulting delay scaled by a `[0.5, 1.5)` jitter factor.
    ExponentialJitter,
}

/// Retry policy for `control:retry`-wrapped nodes (§4.6).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff shape.
    pub strategy: RetryStrategy,
    /// Delay before the second attempt (or every attempt, under `Fixed`).
    pub initial_delay_ms: u64,
    /// Growth factor applied per attempt under exponential strategies.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max_delay_ms: u64,
    /// Allow-list of error kinds (`"transient"`, `"permanent"`,
    /// `"circuit_open"`, `"cancelled"`, `"internal"`) to retry, overriding
    /// [`EngineError::is_retryable_by_default`] when set and no status-code
    /// match applies.
    pub retryable_errors: Option<Vec<String>>,
    /// Deny-list of error kinds checked before any other classification;
    /// a match here is never retried.
    pub non_retryable_errors: Option<Vec<String>>,
    /// HTTP status codes that should be retried, read from the status
    /// embedded in an `action:http` failure message.
    pub retryable_status_codes: Option<Vec<u16>>,
}

impl RetryConfig {
    fn error_kind(error: &EngineError) -> &'static str {
        match error {
            EngineError::Transient(_) => "transient",
            EngineError::Permanent(_) => "permanent",
            EngineError::CircuitOpen => "circuit_open",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }

    fn status_code(error: &EngineError) -> Option<u16> {
        let message = match error {
            EngineError::Transient(message) | EngineError::Permanent(message) => message,
            _ => return None,
        };
        message.strip_prefix("HTTP ")?.split_whitespace().next()?.parse().ok()
    }

    /// Whether `error` should be retried: `non_retryable_errors` always
    /// wins, then `retryable_status_codes` (when the error carries an HTTP
    /// status), then `retryable_errors`, falling back to
    /// [`EngineError::is_retryable_by_default`] when none of the overrides
    /// are configured.
    #[must_use]
    pub fn should_retry(&self, error: &EngineError) -> bool {
        let kind = Self::error_kind(error);
        if let Some(denied) = &self.non_retryable_errors
            && denied.iter().any(|entry| entry == kind)
        {
            return false;
        }
        if let Some(codes) = &self.retryable_status_codes
            && let Some(code) = Self::status_code(error)
        {
            return codes.contains(&code);
        }
        if let Some(allowed) = &self.retryable_errors {
            return allowed.iter().any(|entry| entry == kind);
        }
        error.is_retryable_by_default()
    }

    /// Computes the delay before retrying after a failed `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            RetryStrategy::Fixed => self.initial_delay_ms as f64,
            RetryStrategy::Exponential | RetryStrategy::ExponentialJitter => {
                self.initial_delay_ms as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32)
            }
        };
        let capped = base.min(self.max_delay_ms as f64);

        let scaled = if matches!(self.strategy, RetryStrategy::ExponentialJitter) {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(scaled.max(0.0) as u64)
    }
}

/// Wraps an inner [`NodeExecutor`] with retry-on-transient-failure behavior.
///
/// Retries only [`EngineError::Transient`] failures; permanent failures,
/// cancellation, and circuit-open short-circuits pass straight through.
pub struct Retrying<N> {
    inner: N,
    config: RetryConfig,
}

impl<N> Retrying<N> {
    /// Wraps `inner` with `config`.
    pub fn new(inner: N, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

impl<N> Retrying<N>
where
    N: NodeExecutor,
{
    /// Runs to completion like [`NodeExecutor::execute`], also returning how
    /// many retries were spent (0 when the first attempt succeeded).
    pub async fn execute_counted(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> (Result<Value, EngineError>, u32) {
        let mut attempt = 1;
        loop {
            if ctx.cancellation.is_cancelled() {
                return (Err(EngineError::Cancelled), attempt - 1);
            }

            match self.inner.execute(ctx, config, env).await {
                Ok(output) => return (Ok(output), attempt - 1),
                Err(error) if self.config.should_retry(&error) && attempt < self.config.max_attempts => {
                    let delay = self.config.delay_for(attempt);
                    tracing::debug!(node_id = %ctx.node_id, attempt, delay_ms = delay.as_millis() as u64, %error, "retrying node after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return (Err(error), attempt - 1),
            }
        }
    }
}

#[async_trait]
impl<N> NodeExecutor for Retrying<N>
where
    N: NodeExecutor,
{
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        self.execute_counted(ctx, config, env).await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_ignores_attempt_number() {
        let config = RetryConfig {
            max_attempts: 5,
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            retryable_errors: None,
            non_retryable_errors: None,
            retryable_status_codes: None,
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(4), Duration::from_millis(100));
    }

    #[test]
    fn exponential_strategy_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            strategy: RetryStrategy::Exponential,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 300,
            retryable_errors: None,
            non_retryable_errors: None,
            retryable_status_codes: None,
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(300));
        assert_eq!(config.delay_for(4), Duration::from_millis(300));
    }

    #[test]
    fn jitter_strategy_stays_within_bounds() {
        let config = RetryConfig {
            max_attempts: 5,
            strategy: RetryStrategy::ExponentialJitter,
            initial_delay_ms: 100,
            multiplier: 1.0,
            max_delay_ms: 1_000,
            retryable_errors: None,
            non_retryable_errors: None,
            retryable_status_codes: None,
        };
        let delay = config.delay_for(1);
        assert!(delay >= Duration::from_millis(50) && delay < Duration::from_millis(150));
    }

    struct FlakyExecutor {
        remaining_failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl NodeExecutor for FlakyExecutor {
        async fn execute(&self, _ctx: &NodeContext, _config: &Value, _env: &Environment) -> Result<Value, EngineError> {
            if self.remaining_failures.load(std::sync::atomic::Ordering::SeqCst) > 0 {
                self.remaining_failures.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                return Err(EngineError::Transient("upstream unavailable".to_owned()));
            }
            Ok(Value::String("ok".to_owned()))
        }
    }

    #[tokio::test]
    async fn execute_counted_reports_retries_spent_before_success() {
        let inner = FlakyExecutor {
            remaining_failures: std::sync::atomic::AtomicU32::new(2),
        };
        let config = RetryConfig {
            max_attempts: 3,
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 10,
            retryable_errors: None,
            non_retryable_errors: None,
            retryable_status_codes: None,
        };
        let retrying = Retrying::new(inner, config);
        let ctx = NodeContext {
            tenant_id: orbitflow_core::TenantId::new(),
            execution_id: orbitflow_core::ExecutionId::new(),
            node_id: "http".to_owned(),
            evaluator: std::sync::Arc::new(orbitflow_expression::Evaluator::default()),
            http_client: reqwest::Client::new(),
            cancellation: Cancellation::new(),
        };
        let env = Environment::default();

        let (result, retries) = retrying.execute_counted(&ctx, &Value::Null, &env).await;

        assert!(result.is_ok());
        assert_eq!(retries, 2);
    }

    #[test]
    fn non_retryable_errors_overrides_default_transient_classification() {
        let config = RetryConfig {
            max_attempts: 3,
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 10,
            retryable_errors: None,
            non_retryable_errors: Some(vec!["transient".to_owned()]),
            retryable_status_codes: None,
        };
        let error = EngineError::Transient("upstream unavailable".to_owned());
        assert!(!config.should_retry(&error));
    }

    #[test]
    fn retryable_status_codes_narrows_which_http_statuses_retry() {
        let config = RetryConfig {
            max_attempts: 3,
            strategy: RetryStrategy::Fixed,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 10,
            retryable_errors: None,
            non_retryable_errors: None,
            retryable_status_codes: Some(vec![503]),
        };
        let retry_worthy = EngineError::Transient("HTTP 503 Service Unavailable".to_owned());
        let not_listed = EngineError::Transient("HTTP 500 Internal Server Error".to_owned());
        assert!(config.should_retry(&retry_worthy));
        assert!(!config.should_retry(&not_listed));
    }
}
