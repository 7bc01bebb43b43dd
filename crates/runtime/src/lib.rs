//! Node execution: the registry of leaf node handlers, the retry and
//! circuit-breaker decorators that wrap them, and the error taxonomy node
//! execution reports into.

#![forbid(unsafe_code)]

mod circuit_breaker;
mod conditional;
mod context;
mod delay;
mod error;
mod formula;
mod http;
mod loop_source;
mod node_executor;
mod registry;
mod retry;
mod transform;
mod trigger;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBroken, CircuitState};
pub use conditional::ConditionalExecutor;
pub use context::{Cancellation, NodeContext};
pub use delay::DelayExecutor;
pub use error::EngineError;
pub use formula::FormulaActionExecutor;
pub use http::HttpActionExecutor;
pub use loop_source::LoopSourceExecutor;
pub use node_executor::NodeExecutor;
pub use registry::NodeRegistry;
pub use retry::{RetryConfig, RetryStrategy, Retrying};
pub use transform::TransformActionExecutor;
pub use trigger::TriggerPassthroughExecutor;
