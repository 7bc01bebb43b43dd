use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbitflow_core::{AppResult, ExecutionId, PaginationCursor, StepExecutionId, TenantId, WorkflowId, WorkflowVersionId};
use orbitflow_domain::{Execution, ExecutionFilter, StepExecution, Workflow, WorkflowStatus, WorkflowVersion};

/// Time-bucket granularity for [`Store::execution_trends`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendGranularity {
    /// One bucket per hour.
    Hour,
    /// One bucket per day.
    Day,
}

/// One counted bucket of [`Store::execution_trends`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTrendBucket {
    /// Start of the bucket.
    pub bucket: DateTime<Utc>,
    /// Total executions started in the bucket.
    pub total: i64,
    /// Executions that completed successfully.
    pub success: i64,
    /// Executions that failed.
    pub failed: i64,
}

/// Per-workflow duration percentiles from [`Store::duration_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDurationStats {
    /// Workflow the stats apply to.
    pub workflow_id: WorkflowId,
    /// Mean duration across terminal executions with both timestamps set.
    pub avg_ms: f64,
    /// 50th percentile duration.
    pub p50_ms: f64,
    /// 90th percentile duration.
    pub p90_ms: f64,
    /// 99th percentile duration.
    pub p99_ms: f64,
    /// Number of executions the stats were computed over.
    pub total_runs: i64,
}

/// One entry of [`Store::top_failures`].
#[derive(Debug, Clone, PartialEq)]
pub struct TopFailure {
    /// Workflow with the failures.
    pub workflow_id: WorkflowId,
    /// Total failed executions.
    pub failure_count: i64,
    /// Timestamp of the most recent failure.
    pub last_failed_at: DateTime<Utc>,
    /// Error message of the most recent failure, if recorded.
    pub last_error_message: Option<String>,
}

/// One entry of [`Store::trigger_type_breakdown`].
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerTypeBreakdown {
    /// Trigger type, e.g. `"webhook"`.
    pub trigger_type: String,
    /// Number of executions with this trigger type.
    pub count: i64,
    /// Share of all executions, rounded to two decimals.
    pub percentage: f64,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows on this page, ordered `(created_at DESC, id DESC)`.
    pub items: Vec<T>,
    /// Cursor to pass back for the next page, absent on the last page.
    pub next_cursor: Option<String>,
    /// Whether a further page exists beyond this one.
    pub has_more: bool,
    /// Total rows matching the filter, ignoring the cursor.
    pub total_count: i64,
}

/// Tenant-scoped persistence port for every workflow-engine aggregate (§4.1).
///
/// Every method takes `tenant_id` explicitly and every implementation must
/// apply it as a predicate on every select/update/delete/count — no method
/// here resolves a row by id alone.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a newly created workflow.
    async fn create_workflow(&self, workflow: Workflow) -> AppResult<()>;

    /// Loads one workflow, failing with `NotFound` outside its tenant.
    async fn get_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Workflow>;

    /// Persists an already-loaded workflow's current state.
    async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()>;

    /// Permanently removes a workflow and its versions. Used by bulk delete,
    /// which the testable properties require to make the id subsequently
    /// resolve as `NotFound` — unlike the single-workflow `delete` service
    /// operation, which archives instead of removing the row.
    async fn delete_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()>;

    /// Lists workflows for a tenant, optionally restricted by status.
    async fn list_workflows(
        &self,
        tenant_id: TenantId,
        status: Option<WorkflowStatus>,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Workflow>>;

    /// Persists an immutable version snapshot.
    async fn create_workflow_version(&self, version: WorkflowVersion) -> AppResult<()>;

    /// Loads one version snapshot by its version number.
    async fn get_workflow_version(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: i32,
    ) -> AppResult<WorkflowVersion>;

    /// Lists every version snapshot for a workflow, oldest first.
    async fn list_workflow_versions(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
    ) -> AppResult<Vec<WorkflowVersion>>;

    /// Persists a newly created, pending execution.
    async fn create_execution(&self, execution: Execution) -> AppResult<()>;

    /// Loads one execution, failing with `NotFound` outside its tenant.
    async fn get_execution(&self, tenant_id: TenantId, execution_id: ExecutionId) -> AppResult<Execution>;

    /// Persists an already-loaded execution's current state.
    async fn update_execution(&self, execution: &Execution) -> AppResult<()>;

    /// Persists a newly created step execution record.
    async fn create_step_execution(&self, step: StepExecution) -> AppResult<()>;

    /// Persists an already-loaded step execution's current state.
    async fn update_step_execution(&self, step: &StepExecution) -> AppResult<()>;

    /// Lists every step of an execution, ordered by `started_at` ascending.
    async fn list_step_executions(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> AppResult<Vec<StepExecution>>;

    /// Loads one step execution by id, failing with `NotFound` outside its tenant.
    async fn get_step_execution(
        &self,
        tenant_id: TenantId,
        step_id: StepExecutionId,
    ) -> AppResult<StepExecution>;

    /// Lists executions matching `filter`, applying keyset pagination.
    async fn list_executions_filtered(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Execution>>;

    /// Counts executions matching `filter`, ignoring any cursor.
    async fn count_executions(&self, tenant_id: TenantId, filter: &ExecutionFilter) -> AppResult<i64>;

    /// Counts executions matching `filter` restricted to one status.
    async fn count_executions_by_status(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        status: orbitflow_domain::ExecutionStatus,
    ) -> AppResult<i64>;

    /// Buckets execution counts by hour or day over `[start, end]`.
    async fn execution_trends(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: TrendGranularity,
    ) -> AppResult<Vec<ExecutionTrendBucket>>;

    /// Computes per-workflow duration percentiles over terminal executions.
    async fn duration_stats(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowDurationStats>>;

    /// Returns the workflows with the most failures, most recent first.
    async fn top_failures(&self, tenant_id: TenantId, limit: i64) -> AppResult<Vec<TopFailure>>;

    /// Returns the per-trigger-type share of all executions.
    async fn trigger_type_breakdown(&self, tenant_id: TenantId) -> AppResult<Vec<TriggerTypeBreakdown>>;
}
