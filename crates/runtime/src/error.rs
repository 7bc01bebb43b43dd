use std::fmt;

/// Classification of a node execution failure (§7).
///
/// This is the finer-grained taxonomy `orbitflow_core::AppError` defers to:
/// store-layer failures use the coarse `AppError`, node execution failures
/// use this one, since retry and circuit-breaker wrapping need to know
/// *why* a node failed, not just that it did.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// HTTP 5xx/429/408, transport timeout, explicit rate-limit or timeout.
    /// Retryable per the enclosing retry policy.
    Transient(String),
    /// Invalid credentials, unauthorized/forbidden, HTTP 4xx (except 429),
    /// schema-validation failure. Never retried.
    Permanent(String),
    /// A circuit breaker short-circuited the call without running the node.
    CircuitOpen,
    /// The execution's cancellation context fired before or during the call.
    Cancelled,
    /// Unclassified I/O or invariant violation; treated as permanent.
    Internal(String),
}

impl EngineError {
    /// Returns whether a retry policy should consider this failure
    /// retryable by default, absent any explicit allow/deny-list override.
    #[must_use]
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(message) => write!(formatter, "transient error: {message}"),
            Self::Permanent(message) => write!(formatter, "permanent error: {message}"),
            Self::CircuitOpen => write!(formatter, "circuit open"),
            Self::Cancelled => write!(formatter, "cancelled"),
            Self::Internal(message) => write!(formatter, "internal error: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}
