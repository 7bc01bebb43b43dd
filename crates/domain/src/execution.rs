use chrono::{DateTime, Utc};
use orbitflow_core::{AppError, AppResult, ExecutionId, MAX_EXECUTION_DEPTH, StepExecutionId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Queued, not yet claimed by a worker.
    Pending,
    /// Claimed by a worker and being stepped through.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an unrecoverable error.
    Failed,
    /// Stopped before completion by a caller or a control-flow node.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns whether this status is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Input payload used to construct a new, pending execution.
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Workflow being executed.
    pub workflow_id: WorkflowId,
    /// Workflow definition version frozen at trigger time.
    pub workflow_version: i32,
    /// Trigger type that started the execution, e.g. `"webhook"`.
    pub trigger_type: String,
    /// Trigger payload.
    pub trigger_data: Value,
    /// Parent execution id, set when started by a `control_sub_workflow` node.
    pub parent_execution_id: Option<ExecutionId>,
    /// Nesting depth of the parent execution, `0` for a root execution.
    pub parent_depth: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One run of a workflow, tracked from queueing through completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    id: ExecutionId,
    tenant_id: TenantId,
    workflow_id: WorkflowId,
    workflow_version: i32,
    status: ExecutionStatus,
    trigger_type: String,
    trigger_data: Value,
    output_data: Option<Value>,
    error_message: Option<String>,
    parent_execution_id: Option<ExecutionId>,
    execution_depth: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Execution {
    /// Creates a new, pending execution.
    ///
    /// Rejects a nesting depth beyond [`MAX_EXECUTION_DEPTH`], guarding
    /// against runaway `control_sub_workflow` recursion.
    pub fn new_pending(input: ExecutionInput) -> AppResult<Self> {
        let ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version,
            trigger_type,
            trigger_data,
            parent_execution_id,
            parent_depth,
            created_at,
        } = input;

        let execution_depth = if parent_execution_id.is_some() {
            parent_depth + 1
        } else {
            0
        };

        if execution_depth > MAX_EXECUTION_DEPTH {
            return Err(AppError::Validation(format!(
                "execution depth {execution_depth} exceeds the maximum of {MAX_EXECUTION_DEPTH}"
            )));
        }

        Ok(Self {
            id: ExecutionId::new(),
            tenant_id,
            workflow_id,
            workflow_version,
            status: ExecutionStatus::Pending,
            trigger_type,
            trigger_data,
            output_data: None,
            error_message: None,
            parent_execution_id,
            execution_depth,
            started_at: None,
            completed_at: None,
            created_at,
        })
    }

    /// Returns the execution id.
    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Returns the owning tenant id.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the workflow id this execution runs.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the frozen workflow definition version.
    #[must_use]
    pub fn workflow_version(&self) -> i32 {
        self.workflow_version
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Returns the trigger type that started this execution.
    #[must_use]
    pub fn trigger_type(&self) -> &str {
        self.trigger_type.as_str()
    }

    /// Returns the trigger payload.
    #[must_use]
    pub fn trigger_data(&self) -> &Value {
        &self.trigger_data
    }

    /// Returns the final output, if the execution completed.
    #[must_use]
    pub fn output_data(&self) -> Option<&Value> {
        self.output_data.as_ref()
    }

    /// Returns the failure message, if the execution failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the parent execution id, if started by a sub-workflow node.
    #[must_use]
    pub fn parent_execution_id(&self) -> Option<ExecutionId> {
        self.parent_execution_id
    }

    /// Returns the nesting depth, `0` for a root execution.
    #[must_use]
    pub fn execution_depth(&self) -> i32 {
        self.execution_depth
    }

    /// Returns when the execution started running.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the execution reached a terminal status.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Transitions a pending execution to running.
    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(AppError::Conflict(format!(
                "cannot start execution from status {:?}",
                self.status
            )));
        }

        self.status = ExecutionStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// Transitions a running execution to a terminal status.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        output_data: Option<Value>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status != ExecutionStatus::Running {
            return Err(AppError::Conflict(format!(
                "cannot finish execution from status {:?}",
                self.status
            )));
        }

        if !status.is_terminal() {
            return Err(AppError::Validation(format!(
                "{status:?} is not a terminal execution status"
            )));
        }

        self.status = status;
        self.output_data = output_data;
        self.error_message = error_message;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Cancels a pending or running execution.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::Conflict(
                "cannot cancel an execution that already reached a terminal status".to_owned(),
            ));
        }

        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }
}

/// Status of one node's execution within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Currently executing.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an error.
    Failed,
    /// Not executed because its branch was not taken.
    Skipped,
}

/// Record of one node's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    id: StepExecutionId,
    execution_id: ExecutionId,
    node_id: String,
    node_type: String,
    status: StepStatus,
    input_data: Value,
    output_data: Option<Value>,
    error_message: Option<String>,
    retry_count: i32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
}

impl StepExecution {
    /// Starts a new step execution record.
    #[must_use]
    pub fn start(
        execution_id: ExecutionId,
        node_id: String,
        node_type: String,
        input_data: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StepExecutionId::new(),
            execution_id,
            node_id,
            node_type,
            status: StepStatus::Running,
            input_data,
            output_data: None,
            error_message: None,
            retry_count: 0,
            started_at: now,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Records a node being skipped because its branch was not taken.
    #[must_use]
    pub fn skipped(
        execution_id: ExecutionId,
        node_id: String,
        node_type: String,
        reason: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StepExecutionId::new(),
            execution_id,
            node_id,
            node_type,
            status: StepStatus::Skipped,
            input_data: Value::Null,
            output_data: None,
            error_message: Some(reason),
            retry_count: 0,
            started_at: now,
            completed_at: Some(now),
            duration_ms: Some(0),
        }
    }

    /// Returns the step execution id.
    #[must_use]
    pub fn id(&self) -> StepExecutionId {
        self.id
    }

    /// Returns the owning execution id.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the node id this record belongs to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        self.node_id.as_str()
    }

    /// Returns the node kind as a stable string.
    #[must_use]
    pub fn node_type(&self) -> &str {
        self.node_type.as_str()
    }

    /// Returns the current step status.
    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// Returns the node's input snapshot.
    #[must_use]
    pub fn input_data(&self) -> &Value {
        &self.input_data
    }

    /// Returns the node's output, if it completed.
    #[must_use]
    pub fn output_data(&self) -> Option<&Value> {
        self.output_data.as_ref()
    }

    /// Returns the failure message, if it failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns how many retry attempts preceded this record's final state.
    #[must_use]
    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    /// Returns when the node started executing.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the node reached a terminal status.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the node's wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    /// Increments the retry counter before a retried attempt runs.
    pub fn record_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Completes a running step with its output.
    pub fn complete(&mut self, output_data: Value, now: DateTime<Utc>) -> AppResult<()> {
        self.finish(StepStatus::Completed, Some(output_data), None, now)
    }

    /// Fails a running step with its error message.
    pub fn fail(&mut self, error_message: String, now: DateTime<Utc>) -> AppResult<()> {
        self.finish(StepStatus::Failed, None, Some(error_message), now)
    }

    fn finish(
        &mut self,
        status: StepStatus,
        output_data: Option<Value>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status != StepStatus::Running {
            return Err(AppError::Conflict(format!(
                "cannot finish step from status {:?}",
                self.status
            )));
        }

        self.status = status;
        self.output_data = output_data;
        self.error_message = error_message;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_input(now: DateTime<Utc>) -> ExecutionInput {
        ExecutionInput {
            tenant_id: TenantId::new(),
            workflow_id: WorkflowId::new(),
            workflow_version: 1,
            trigger_type: "manual".to_owned(),
            trigger_data: Value::Null,
            parent_execution_id: None,
            parent_depth: 0,
            created_at: now,
        }
    }

    #[test]
    fn new_pending_rejects_depth_beyond_maximum() {
        let now = Utc::now();
        let mut input = pending_input(now);
        input.parent_execution_id = Some(ExecutionId::new());
        input.parent_depth = MAX_EXECUTION_DEPTH;

        let result = Execution::new_pending(input);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn start_then_finish_transitions_successfully() {
        let now = Utc::now();
        let execution = Execution::new_pending(pending_input(now));
        assert!(execution.is_ok());
        let mut execution = execution.unwrap_or_else(|_| unreachable!());

        assert!(execution.start(now).is_ok());
        assert_eq!(execution.status(), ExecutionStatus::Running);

        let result = execution.finish(ExecutionStatus::Completed, Some(Value::Bool(true)), None, now);
        assert!(result.is_ok());
        assert_eq!(execution.status(), ExecutionStatus::Completed);
    }

    #[test]
    fn finish_rejects_non_running_execution() {
        let now = Utc::now();
        let execution = Execution::new_pending(pending_input(now));
        assert!(execution.is_ok());
        let mut execution = execution.unwrap_or_else(|_| unreachable!());

        let result = execution.finish(ExecutionStatus::Completed, None, None, now);
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn finish_rejects_non_terminal_status() {
        let now = Utc::now();
        let execution = Execution::new_pending(pending_input(now));
        assert!(execution.is_ok());
        let mut execution = execution.unwrap_or_else(|_| unreachable!());
        assert!(execution.start(now).is_ok());

        let result = execution.finish(ExecutionStatus::Running, None, None, now);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn step_duration_is_computed_on_completion() {
        let started = Utc::now();
        let finished = started + chrono::Duration::milliseconds(250);
        let mut step = StepExecution::start(
            ExecutionId::new(),
            "n1".to_owned(),
            "action_http".to_owned(),
            Value::Null,
            started,
        );

        let result = step.complete(Value::Bool(true), finished);
        assert!(result.is_ok());
        assert_eq!(step.duration_ms(), Some(250));
    }
}
