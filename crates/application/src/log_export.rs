use std::fmt::Write as _;

use orbitflow_domain::{Execution, StepExecution};
use serde_json::Value;

/// Output formats [`export`] can render an execution's log into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain-text, human-readable summary.
    Text,
    /// Structured JSON with nested step records.
    Json,
    /// One row per step, for spreadsheet import.
    Csv,
}

fn enum_name(value: impl serde::Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Renders an execution and its steps into `format`.
#[must_use]
pub fn export(execution: &Execution, steps: &[StepExecution], format: LogFormat) -> String {
    match format {
        LogFormat::Text => export_text(execution, steps),
        LogFormat::Json => export_json(execution, steps).to_string(),
        LogFormat::Csv => export_csv(steps),
    }
}

fn export_text(execution: &Execution, steps: &[StepExecution]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "execution {}", execution.id());
    let _ = writeln!(out, "workflow {} (version {})", execution.workflow_id(), execution.workflow_version());
    let _ = writeln!(out, "status {}", enum_name(execution.status()));
    let _ = writeln!(out, "trigger {}", execution.trigger_type());
    let _ = writeln!(out, "started {}", execution.started_at().map(|ts| ts.to_rfc3339()).unwrap_or_default());
    let _ = writeln!(out, "completed {}", execution.completed_at().map(|ts| ts.to_rfc3339()).unwrap_or_default());
    if let Some(error) = execution.error_message() {
        let _ = writeln!(out, "error {error}");
    }
    let _ = writeln!(out);

    for step in steps {
        let _ = writeln!(out, "[{}] {} ({})", enum_name(step.status()), step.node_id(), step.node_type());
        let _ = writeln!(out, "  started {}", step.started_at().to_rfc3339());
        if let Some(completed_at) = step.completed_at() {
            let _ = writeln!(out, "  completed {}", completed_at.to_rfc3339());
        }
        if let Some(duration_ms) = step.duration_ms() {
            let _ = writeln!(out, "  duration_ms {duration_ms}");
        }
        if step.retry_count() > 0 {
            let _ = writeln!(out, "  retry_count {}", step.retry_count());
        }
        if let Some(error) = step.error_message() {
            let _ = writeln!(out, "  error {error}");
        }
        let _ = writeln!(out);
    }

    out
}

fn export_json(execution: &Execution, steps: &[StepExecution]) -> Value {
    let step_entries: Vec<Value> = steps
        .iter()
        .map(|step| {
            serde_json::json!({
                "step_id": step.id().to_string(),
                "node_id": step.node_id(),
                "node_type": step.node_type(),
                "status": enum_name(step.status()),
                "started_at": step.started_at().to_rfc3339(),
                "completed_at": step.completed_at().map(|ts| ts.to_rfc3339()),
                "duration_ms": step.duration_ms(),
                "retry_count": step.retry_count(),
                "input_data": step.input_data(),
                "output_data": step.output_data(),
                "error_message": step.error_message(),
            })
        })
        .collect();

    serde_json::json!({
        "execution_id": execution.id().to_string(),
        "workflow_id": execution.workflow_id().to_string(),
        "workflow_version": execution.workflow_version(),
        "status": enum_name(execution.status()),
        "trigger_type": execution.trigger_type(),
        "started_at": execution.started_at().map(|ts| ts.to_rfc3339()),
        "completed_at": execution.completed_at().map(|ts| ts.to_rfc3339()),
        "output_data": execution.output_data(),
        "error_message": execution.error_message(),
        "steps": step_entries,
    })
}

const CSV_HEADER: &str = "step_id,node_id,node_type,status,started_at,completed_at,duration_ms,error_message";

fn csv_field(value: &str) -> String {
    if value.contains(['"', ',', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

fn export_csv(steps: &[StepExecution]) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for step in steps {
        let completed_at = step.completed_at().map(|ts| ts.to_rfc3339()).unwrap_or_default();
        let duration_ms = step.duration_ms().map(|ms| ms.to_string()).unwrap_or_default();
        let error_message = step.error_message().unwrap_or_default();

        let row = [
            step.id().to_string(),
            step.node_id().to_owned(),
            step.node_type().to_owned(),
            enum_name(step.status()),
            step.started_at().to_rfc3339(),
            completed_at,
            duration_ms,
            error_message.to_owned(),
        ];
        let line = row.iter().map(|field| csv_field(field)).collect::<Vec<_>>().join(",");
        out.push_str(&line);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use orbitflow_core::{ExecutionId, TenantId, WorkflowId};
    use orbitflow_domain::{ExecutionInput, StepExecution};
    use serde_json::json;

    use super::*;

    fn sample_execution() -> Execution {
        let mut execution = Execution::new_pending(ExecutionInput {
            tenant_id: TenantId::new(),
            workflow_id: WorkflowId::new(),
            workflow_version: 1,
            trigger_type: "manual".to_owned(),
            trigger_data: json!({}),
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })
        .unwrap_or_else(|_| unreachable!());
        execution.start(Utc::now()).unwrap_or_default();
        execution
            .finish(orbitflow_domain::ExecutionStatus::Completed, Some(json!({"ok": true})), None, Utc::now())
            .unwrap_or_default();
        execution
    }

    fn sample_step(execution_id: ExecutionId) -> StepExecution {
        let mut step = StepExecution::start(execution_id, "n1".to_owned(), "action_http".to_owned(), json!({}), Utc::now());
        let _ = step.complete(json!({"status": 200}), Utc::now());
        step
    }

    #[test]
    fn text_export_contains_execution_and_step_ids() {
        let execution = sample_execution();
        let steps = vec![sample_step(execution.id())];
        let rendered = export(&execution, &steps, LogFormat::Text);
        assert!(rendered.contains(&execution.id().to_string()));
        assert!(rendered.contains("n1"));
        assert!(rendered.contains("completed"));
    }

    #[test]
    fn json_export_embeds_parsed_output_data() {
        let execution = sample_execution();
        let steps = vec![sample_step(execution.id())];
        let rendered = export(&execution, &steps, LogFormat::Json);
        let parsed: Value = serde_json::from_str(&rendered).unwrap_or(Value::Null);
        assert_eq!(parsed["steps"][0]["output_data"]["status"], json!(200));
    }

    #[test]
    fn csv_export_quotes_embedded_commas() {
        let execution_id = ExecutionId::new();
        let mut step = StepExecution::start(execution_id, "n1".to_owned(), "action_http".to_owned(), json!({}), Utc::now());
        let _ = step.fail("boom, with a comma".to_owned(), Utc::now());
        let rendered = export_csv(&[step]);
        assert!(rendered.contains("\"boom, with a comma\""));
        assert!(rendered.starts_with(CSV_HEADER));
    }
}
