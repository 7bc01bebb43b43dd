use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbitflow_application::{
    ExecutionTrendBucket, Page, Store, TopFailure, TrendGranularity, TriggerTypeBreakdown,
    WorkflowDurationStats,
};
use orbitflow_core::{AppError, AppResult, ExecutionId, PaginationCursor, StepExecutionId, TenantId, WorkflowId};
use orbitflow_domain::{Execution, ExecutionFilter, ExecutionStatus, StepExecution, Workflow, WorkflowStatus, WorkflowVersion};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::pagination::paginate;

/// PostgreSQL-backed [`Store`]. Every aggregate is persisted as a single
/// JSONB body column alongside the extracted columns SQL needs for tenant
/// scoping, ordering and coarse filtering.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn internal(context: &str) -> impl Fn(sqlx::Error) -> AppError + '_ {
    move |error| AppError::Internal(format!("{context}: {error}"))
}

fn decode<T: serde::de::DeserializeOwned>(body: Value, context: &str) -> AppResult<T> {
    serde_json::from_value(body).map_err(|error| AppError::Internal(format!("{context}: {error}")))
}

#[derive(FromRow)]
struct BodyRow {
    body: Value,
}

#[derive(FromRow)]
struct ExecutionRow {
    created_at: DateTime<Utc>,
    body: Value,
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let body = serde_json::to_value(&workflow).map_err(|error| AppError::Internal(format!("failed to encode workflow: {error}")))?;
        sqlx::query(
            "INSERT INTO workflows (id, tenant_id, status, version, created_at, updated_at, body)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(workflow.id().as_uuid())
        .bind(workflow.tenant_id().as_uuid())
        .bind(status_name(workflow.status()))
        .bind(workflow.version())
        .bind(workflow.created_at())
        .bind(workflow.updated_at())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(internal("failed to create workflow"))?;
        Ok(())
    }

    async fn get_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Workflow> {
        let row = sqlx::query_as::<_, BodyRow>("SELECT body FROM workflows WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(workflow_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("failed to load workflow"))?
            .ok_or_else(|| AppError::NotFound(format!("workflow {workflow_id} not found")))?;
        decode(row.body, "failed to decode workflow")
    }

    async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let body = serde_json::to_value(workflow).map_err(|error| AppError::Internal(format!("failed to encode workflow: {error}")))?;
        let result = sqlx::query(
            "UPDATE workflows SET status = $1, version = $2, updated_at = $3, body = $4
             WHERE tenant_id = $5 AND id = $6",
        )
        .bind(status_name(workflow.status()))
        .bind(workflow.version())
        .bind(workflow.updated_at())
        .bind(body)
        .bind(workflow.tenant_id().as_uuid())
        .bind(workflow.id().as_uuid())
        .execute(&self.pool)
        .await
        .map_err(internal("failed to update workflow"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("workflow {} not found", workflow.id())));
        }
        Ok(())
    }

    async fn delete_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(workflow_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(internal("failed to delete workflow"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("workflow {workflow_id} not found")));
        }
        Ok(())
    }

    async fn list_workflows(
        &self,
        tenant_id: TenantId,
        status: Option<WorkflowStatus>,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Workflow>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT created_at, body FROM workflows WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(tenant_id.as_uuid())
        .bind(status.map(status_name))
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to list workflows"))?;

        let decoded: AppResult<Vec<(DateTime<Utc>, uuid::Uuid, Workflow)>> = rows
            .into_iter()
            .map(|row| {
                let workflow: Workflow = decode(row.body, "failed to decode workflow")?;
                Ok((row.created_at, workflow.id().as_uuid(), workflow))
            })
            .collect();
        paginate(decoded?, cursor, limit)
    }

    async fn create_workflow_version(&self, version: WorkflowVersion) -> AppResult<()> {
        let tenant_id = sqlx::query_as::<_, (uuid::Uuid,)>("SELECT tenant_id FROM workflows WHERE id = $1")
            .bind(version.workflow_id().as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("failed to resolve workflow tenant"))?
            .ok_or_else(|| AppError::NotFound(format!("workflow {} not found", version.workflow_id())))?
            .0;

        let body = serde_json::to_value(&version).map_err(|error| AppError::Internal(format!("failed to encode workflow version: {error}")))?;
        sqlx::query(
            "INSERT INTO workflow_versions (id, tenant_id, workflow_id, version, created_at, body)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(version.id().as_uuid())
        .bind(tenant_id)
        .bind(version.workflow_id().as_uuid())
        .bind(version.version())
        .bind(version.created_at())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(internal("failed to create workflow version"))?;
        Ok(())
    }

    async fn get_workflow_version(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: i32,
    ) -> AppResult<WorkflowVersion> {
        let row = sqlx::query_as::<_, BodyRow>(
            "SELECT body FROM workflow_versions WHERE tenant_id = $1 AND workflow_id = $2 AND version = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(workflow_id.as_uuid())
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("failed to load workflow version"))?
        .ok_or_else(|| AppError::NotFound(format!("workflow {workflow_id} version {version} not found")))?;
        decode(row.body, "failed to decode workflow version")
    }

    async fn list_workflow_versions(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowVersion>> {
        let rows = sqlx::query_as::<_, BodyRow>(
            "SELECT body FROM workflow_versions WHERE tenant_id = $1 AND workflow_id = $2 ORDER BY version ASC",
        )
        .bind(tenant_id.as_uuid())
        .bind(workflow_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to list workflow versions"))?;
        rows.into_iter().map(|row| decode(row.body, "failed to decode workflow version")).collect()
    }

    async fn create_execution(&self, execution: Execution) -> AppResult<()> {
        let body = serde_json::to_value(&execution).map_err(|error| AppError::Internal(format!("failed to encode execution: {error}")))?;
        sqlx::query(
            "INSERT INTO executions (
                id, tenant_id, workflow_id, status, trigger_type, error_message,
                created_at, started_at, completed_at, body
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(execution.id().as_uuid())
        .bind(execution.tenant_id().as_uuid())
        .bind(execution.workflow_id().as_uuid())
        .bind(execution_status_name(execution.status()))
        .bind(execution.trigger_type())
        .bind(execution.error_message())
        .bind(execution.created_at())
        .bind(execution.started_at())
        .bind(execution.completed_at())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(internal("failed to create execution"))?;
        Ok(())
    }

    async fn get_execution(&self, tenant_id: TenantId, execution_id: ExecutionId) -> AppResult<Execution> {
        let row = sqlx::query_as::<_, BodyRow>("SELECT body FROM executions WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(execution_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("failed to load execution"))?
            .ok_or_else(|| AppError::NotFound(format!("execution {execution_id} not found")))?;
        decode(row.body, "failed to decode execution")
    }

    async fn update_execution(&self, execution: &Execution) -> AppResult<()> {
        let body = serde_json::to_value(execution).map_err(|error| AppError::Internal(format!("failed to encode execution: {error}")))?;
        let result = sqlx::query(
            "UPDATE executions SET status = $1, error_message = $2, started_at = $3, completed_at = $4, body = $5
             WHERE tenant_id = $6 AND id = $7",
        )
        .bind(execution_status_name(execution.status()))
        .bind(execution.error_message())
        .bind(execution.started_at())
        .bind(execution.completed_at())
        .bind(body)
        .bind(execution.tenant_id().as_uuid())
        .bind(execution.id().as_uuid())
        .execute(&self.pool)
        .await
        .map_err(internal("failed to update execution"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("execution {} not found", execution.id())));
        }
        Ok(())
    }

    async fn create_step_execution(&self, step: StepExecution) -> AppResult<()> {
        let body = serde_json::to_value(&step).map_err(|error| AppError::Internal(format!("failed to encode step execution: {error}")))?;
        sqlx::query(
            "INSERT INTO step_executions (id, execution_id, node_id, node_type, status, started_at, body)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(step.id().as_uuid())
        .bind(step.execution_id().as_uuid())
        .bind(step.node_id())
        .bind(step.node_type())
        .bind(step_status_name(step.status()))
        .bind(step.started_at())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(internal("failed to create step execution"))?;
        Ok(())
    }

    async fn update_step_execution(&self, step: &StepExecution) -> AppResult<()> {
        let body = serde_json::to_value(step).map_err(|error| AppError::Internal(format!("failed to encode step execution: {error}")))?;
        let result = sqlx::query("UPDATE step_executions SET status = $1, body = $2 WHERE id = $3")
            .bind(step_status_name(step.status()))
            .bind(body)
            .bind(step.id().as_uuid())
            .execute(&self.pool)
            .await
            .map_err(internal("failed to update step execution"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("step execution {} not found", step.id())));
        }
        Ok(())
    }

    async fn list_step_executions(&self, tenant_id: TenantId, execution_id: ExecutionId) -> AppResult<Vec<StepExecution>> {
        let owned = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM executions WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(execution_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(internal("failed to verify execution ownership"))?
            .0;
        if owned == 0 {
            return Err(AppError::NotFound(format!("execution {execution_id} not found")));
        }

        let rows = sqlx::query_as::<_, BodyRow>(
            "SELECT body FROM step_executions WHERE execution_id = $1 ORDER BY started_at ASC",
        )
        .bind(execution_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to list step executions"))?;
        rows.into_iter().map(|row| decode(row.body, "failed to decode step execution")).collect()
    }

    async fn get_step_execution(&self, tenant_id: TenantId, step_id: StepExecutionId) -> AppResult<StepExecution> {
        let row = sqlx::query_as::<_, BodyRow>(
            "SELECT step_executions.body
             FROM step_executions
             INNER JOIN executions ON executions.id = step_executions.execution_id
             WHERE executions.tenant_id = $1 AND step_executions.id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(step_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal("failed to load step execution"))?
        .ok_or_else(|| AppError::NotFound(format!("step execution {step_id} not found")))?;
        decode(row.body, "failed to decode step execution")
    }

    async fn list_executions_filtered(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Execution>> {
        filter.validate()?;
        let limit = limit.max(1);

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM executions WHERE tenant_id = ");
        count_builder.push_bind(tenant_id.as_uuid());
        push_execution_filter(&mut count_builder, filter);
        let total_count: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(internal("failed to count executions"))?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT id, created_at, body FROM executions WHERE tenant_id = ");
        builder.push_bind(tenant_id.as_uuid());
        push_execution_filter(&mut builder, filter);
        if let Some(cursor) = &cursor {
            builder.push(" AND (created_at, id) < (");
            builder.push_bind(cursor.created_at);
            builder.push(", ");
            builder.push_bind(cursor.id);
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(limit + 1);

        let rows = builder
            .build_query_as::<IdExecutionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(internal("failed to list executions"))?;

        let has_more = rows.len() as i64 > limit;
        let page_rows = if has_more { &rows[..limit as usize] } else { &rows[..] };

        let items: AppResult<Vec<Execution>> =
            page_rows.iter().map(|row| decode(row.body.clone(), "failed to decode execution")).collect();
        let items = items?;

        let next_cursor = if has_more {
            page_rows
                .last()
                .map(|row| PaginationCursor::new(row.created_at, row.id).encode())
                .transpose()?
        } else {
            None
        };

        Ok(Page { items, next_cursor, has_more, total_count })
    }

    async fn count_executions(&self, tenant_id: TenantId, filter: &ExecutionFilter) -> AppResult<i64> {
        filter.validate()?;
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM executions WHERE tenant_id = ");
        builder.push_bind(tenant_id.as_uuid());
        push_execution_filter(&mut builder, filter);
        builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(internal("failed to count executions"))
    }

    async fn count_executions_by_status(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        status: ExecutionStatus,
    ) -> AppResult<i64> {
        filter.validate()?;
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM executions WHERE tenant_id = ");
        builder.push_bind(tenant_id.as_uuid());
        builder.push(" AND status = ");
        builder.push_bind(execution_status_name(status));
        push_execution_filter(&mut builder, filter);
        builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(internal("failed to count executions by status"))
    }

    async fn execution_trends(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: TrendGranularity,
    ) -> AppResult<Vec<ExecutionTrendBucket>> {
        let interval = match granularity {
            TrendGranularity::Hour => "1 hour",
            TrendGranularity::Day => "1 day",
        };

        let rows = sqlx::query_as::<_, TrendRow>(
            "SELECT b.bucket AS bucket,
                    COUNT(e.id) AS total,
                    COUNT(e.id) FILTER (WHERE e.status = 'completed') AS success,
                    COUNT(e.id) FILTER (WHERE e.status = 'failed') AS failed
             FROM generate_series($2::timestamptz, $3::timestamptz, $4::interval) AS b(bucket)
             LEFT JOIN executions e
               ON e.tenant_id = $1 AND e.created_at >= b.bucket AND e.created_at < b.bucket + $4::interval
             GROUP BY b.bucket
             ORDER BY b.bucket",
        )
        .bind(tenant_id.as_uuid())
        .bind(start)
        .bind(end)
        .bind(interval)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to compute execution trends"))?;

        Ok(rows
            .into_iter()
            .map(|row| ExecutionTrendBucket { bucket: row.bucket, total: row.total, success: row.success, failed: row.failed })
            .collect())
    }

    async fn duration_stats(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowDurationStats>> {
        let rows = sqlx::query_as::<_, DurationStatsRow>(
            "SELECT workflow_id,
                    COUNT(*) AS total_runs,
                    AVG(duration_ms) AS avg_ms,
                    PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY duration_ms) AS p50_ms,
                    PERCENTILE_CONT(0.9) WITHIN GROUP (ORDER BY duration_ms) AS p90_ms,
                    PERCENTILE_CONT(0.99) WITHIN GROUP (ORDER BY duration_ms) AS p99_ms
             FROM (
                 SELECT workflow_id, EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000 AS duration_ms
                 FROM executions
                 WHERE tenant_id = $1 AND started_at IS NOT NULL AND completed_at IS NOT NULL
             ) durations
             GROUP BY workflow_id
             ORDER BY workflow_id",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to compute duration stats"))?;

        Ok(rows
            .into_iter()
            .map(|row| WorkflowDurationStats {
                workflow_id: WorkflowId::from_uuid(row.workflow_id),
                avg_ms: row.avg_ms,
                p50_ms: row.p50_ms,
                p90_ms: row.p90_ms,
                p99_ms: row.p99_ms,
                total_runs: row.total_runs,
            })
            .collect())
    }

    async fn top_failures(&self, tenant_id: TenantId, limit: i64) -> AppResult<Vec<TopFailure>> {
        let rows = sqlx::query_as::<_, TopFailureRow>(
            "SELECT workflow_id,
                    COUNT(*) AS failure_count,
                    MAX(created_at) AS last_failed_at,
                    (ARRAY_AGG(error_message ORDER BY created_at DESC))[1] AS last_error_message
             FROM executions
             WHERE tenant_id = $1 AND status = 'failed'
             GROUP BY workflow_id
             ORDER BY failure_count DESC, last_failed_at DESC
             LIMIT $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to compute top failures"))?;

        Ok(rows
            .into_iter()
            .map(|row| TopFailure {
                workflow_id: WorkflowId::from_uuid(row.workflow_id),
                failure_count: row.failure_count,
                last_failed_at: row.last_failed_at,
                last_error_message: row.last_error_message,
            })
            .collect())
    }

    async fn trigger_type_breakdown(&self, tenant_id: TenantId) -> AppResult<Vec<TriggerTypeBreakdown>> {
        let rows = sqlx::query_as::<_, TriggerBreakdownRow>(
            "SELECT trigger_type,
                    COUNT(*) AS count,
                    ROUND((COUNT(*) * 100.0 / NULLIF(SUM(COUNT(*)) OVER (), 0))::numeric, 2)::float8 AS percentage
             FROM executions
             WHERE tenant_id = $1
             GROUP BY trigger_type
             ORDER BY count DESC, trigger_type ASC",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(internal("failed to compute trigger type breakdown"))?;

        Ok(rows
            .into_iter()
            .map(|row| TriggerTypeBreakdown { trigger_type: row.trigger_type, count: row.count, percentage: row.percentage })
            .collect())
    }
}

/// Appends every [`ExecutionFilter`] predicate not already bound as a
/// positional parameter, pushing filtering into the query instead of
/// materializing unfiltered rows.
fn push_execution_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a ExecutionFilter) {
    if let Some(workflow_id) = filter.workflow_id {
        builder.push(" AND workflow_id = ").push_bind(workflow_id.as_uuid());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(execution_status_name(status));
    }
    if let Some(trigger_type) = &filter.trigger_type {
        builder.push(" AND trigger_type = ").push_bind(trigger_type);
    }
    if let Some(start_date) = filter.start_date {
        builder.push(" AND created_at >= ").push_bind(start_date);
    }
    if let Some(end_date) = filter.end_date {
        builder.push(" AND created_at <= ").push_bind(end_date);
    }
    if let Some(needle) = &filter.error_search {
        builder.push(" AND error_message IS NOT NULL AND POSITION(").push_bind(needle).push(" IN error_message) > 0");
    }
    if let Some(prefix) = &filter.execution_id_prefix {
        builder.push(" AND id::text LIKE (").push_bind(prefix).push(" || '%')");
    }
    if let Some(min_duration_ms) = filter.min_duration_ms {
        builder
            .push(" AND started_at IS NOT NULL AND completed_at IS NOT NULL AND EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000 >= ")
            .push_bind(min_duration_ms as f64);
    }
    if let Some(max_duration_ms) = filter.max_duration_ms {
        builder
            .push(" AND started_at IS NOT NULL AND completed_at IS NOT NULL AND EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000 <= ")
            .push_bind(max_duration_ms as f64);
    }
}

#[derive(FromRow)]
struct IdExecutionRow {
    id: uuid::Uuid,
    created_at: DateTime<Utc>,
    body: Value,
}

#[derive(FromRow)]
struct TrendRow {
    bucket: DateTime<Utc>,
    total: i64,
    success: i64,
    failed: i64,
}

#[derive(FromRow)]
struct DurationStatsRow {
    workflow_id: uuid::Uuid,
    total_runs: i64,
    avg_ms: f64,
    p50_ms: f64,
    p90_ms: f64,
    p99_ms: f64,
}

#[derive(FromRow)]
struct TopFailureRow {
    workflow_id: uuid::Uuid,
    failure_count: i64,
    last_failed_at: DateTime<Utc>,
    last_error_message: Option<String>,
}

#[derive(FromRow)]
struct TriggerBreakdownRow {
    trigger_type: String,
    count: i64,
    percentage: f64,
}

fn status_name(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Draft => "draft",
        WorkflowStatus::Active => "active",
        WorkflowStatus::Inactive => "inactive",
        WorkflowStatus::Archived => "archived",
    }
}

fn execution_status_name(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

fn step_status_name(status: orbitflow_domain::StepStatus) -> &'static str {
    match status {
        orbitflow_domain::StepStatus::Running => "running",
        orbitflow_domain::StepStatus::Completed => "completed",
        orbitflow_domain::StepStatus::Failed => "failed",
        orbitflow_domain::StepStatus::Skipped => "skipped",
    }
}
