use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// `action:formula` — evaluates `expression` with the cached evaluator.
///
/// `output_variable` binding happens in the executor, which owns the
/// mutable environment this node only borrows.
pub struct FormulaActionExecutor;

#[async_trait]
impl NodeExecutor for FormulaActionExecutor {
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let expression = config
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::Permanent("action:formula requires an \"expression\" string".to_owned())
            })?;

        ctx.evaluator
            .evaluate(expression, env)
            .map_err(|error| EngineError::Permanent(error.to_string()))
    }
}
