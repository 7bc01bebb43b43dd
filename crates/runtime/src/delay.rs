use std::time::Duration;

use async_trait::async_trait;
use orbitflow_expression::Environment;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::EngineError;
use crate::node_executor::NodeExecutor;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn parse_duration(text: &str) -> Result<Duration, EngineError> {
    let text = text.trim();
    let (digits, unit) = text
        .find(|ch: char| !ch.is_ascii_digit() && ch != '.')
        .map(|split| text.split_at(split))
        .ok_or_else(|| EngineError::Permanent(format!("control:delay duration missing a unit: {text}")))?;

    let magnitude: f64 = digits
        .parse()
        .map_err(|_| EngineError::Permanent(format!("control:delay invalid duration: {text}")))?;

    let millis = match unit {
        "ms" => magnitude,
        "s" => magnitude * 1_000.0,
        "m" => magnitude * 60_000.0,
        "h" => magnitude * 3_600_000.0,
        other => {
            return Err(EngineError::Permanent(format!(
                "control:delay unknown duration unit: {other}"
            )));
        }
    };

    Ok(Duration::from_millis(millis.max(0.0) as u64))
}

/// `control:delay` — pauses for a template-expanded duration, waking
/// immediately on cancellation rather than at the sleep deadline.
pub struct DelayExecutor;

#[async_trait]
impl NodeExecutor for DelayExecutor {
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &Value,
        env: &Environment,
    ) -> Result<Value, EngineError> {
        let duration_text = config
            .get("duration")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Permanent("control:delay requires a \"duration\" string".to_owned()))?;

        let rendered = orbitflow_expression::render_template(duration_text, env)
            .map_err(|error| EngineError::Permanent(error.to_string()))?;
        let rendered_text = rendered
            .as_str()
            .ok_or_else(|| EngineError::Permanent("control:delay duration must render to a string".to_owned()))?;

        let mut remaining = parse_duration(rendered_text)?;
        while remaining > Duration::ZERO {
            if ctx.cancellation.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let tick = remaining.min(POLL_INTERVAL);
            tokio::time::sleep(tick).await;
            remaining = remaining.saturating_sub(tick);
        }

        if ctx.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_and_minutes() {
        assert_eq!(parse_duration("30s").unwrap_or(Duration::ZERO), Duration::from_millis(30_000));
        assert_eq!(parse_duration("2m").unwrap_or(Duration::ZERO), Duration::from_millis(120_000));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5x").is_err());
    }
}
