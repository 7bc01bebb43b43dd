use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// `control:if` — evaluates `condition` and yields the boolean result; the
/// executor selects the outgoing edge labeled `"true"`/`"false"` and honors
/// `stop_on_true`/`stop_on_false` from the same config.
pub struct ConditionalExecutor;

#[async_trait]
impl NodeExecutor for ConditionalExecutor {
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let condition = config
            .get("condition")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Permanent("control:if requires a \"condition\" string".to_owned()))?;

        let result = ctx
            .evaluator
            .evaluate(condition, env)
            .map_err(|error| EngineError::Permanent(error.to_string()))?;

        match result {
            Value::Bool(flag) => Ok(Value::Bool(flag)),
            other => Err(EngineError::Permanent(format!(
                "control:if condition must evaluate to a boolean, got {other}"
            ))),
        }
    }
}
