use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// `control:loop` — resolves `source` to the array the executor iterates.
///
/// Binding `item_variable`/`index_variable` per iteration and walking the
/// downstream sub-graph is the executor's job; it needs the node registry
/// and `StepExecution` bookkeeping that a single node handler does not have.
pub struct LoopSourceExecutor;

#[async_trait]
impl NodeExecutor for LoopSourceExecutor {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let source = config
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Permanent("control:loop requires a \"source\" string".to_owned()))?;

        let resolved = orbitflow_expression::render_template(source, env)
            .map_err(|error| EngineError::Permanent(error.to_string()))?;

        match resolved {
            Value::Array(_) => Ok(resolved),
            other => Err(EngineError::Permanent(format!(
                "control:loop source must resolve to an array, got {other}"
            ))),
        }
    }
}
