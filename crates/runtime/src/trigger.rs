use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

/// Trigger nodes are never driven by the executor's topological walk — their
/// presence only registers the workflow with an external collaborator
/// (webhook/schedule synchronizer). This handler exists purely so the
/// registry maps every [`orbitflow_domain::NodeKind`] to a handler; if it is
/// ever invoked, it passes the trigger payload through unchanged.
pub struct TriggerPassthroughExecutor;

#[async_trait]
impl NodeExecutor for TriggerPassthroughExecutor {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        _config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        Ok(env.get_root("trigger").cloned().unwrap_or(Value::Null))
    }
}
