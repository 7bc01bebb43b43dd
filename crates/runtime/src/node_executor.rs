use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;

/// Uniform execution contract every node kind implements (§4.5).
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Runs this node, producing its output or a classified failure.
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError>;
}
