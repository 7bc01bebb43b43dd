use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

fn render_recursive(value: &Value, env: &Environment) -> Result<Value, EngineError> {
    match value {
        Value::String(text) => orbitflow_expression::render_template(text, env)
            .map_err(|error| EngineError::Permanent(error.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|item| render_recursive(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, field)| render_recursive(field, env).map(|rendered| (key.clone(), rendered)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// `action:transform` — expands every string in `mapping` via the templater.
pub struct TransformActionExecutor;

#[async_trait]
impl NodeExecutor for TransformActionExecutor {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let mapping = config
            .get("mapping")
            .ok_or_else(|| EngineError::Permanent("action:transform requires a \"mapping\" object".to_owned()))?;

        render_recursive(mapping, env)
    }
}
