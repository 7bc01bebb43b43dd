use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use orbitflow_application::{
    ExecutionTrendBucket, Page, Store, TopFailure, TrendGranularity, TriggerTypeBreakdown,
    WorkflowDurationStats,
};
use orbitflow_core::{AppError, AppResult, ExecutionId, PaginationCursor, StepExecutionId, TenantId, WorkflowId};
use orbitflow_domain::{Execution, ExecutionFilter, ExecutionStatus, StepExecution, Workflow, WorkflowStatus, WorkflowVersion};
use tokio::sync::RwLock;

use crate::pagination::{duration_percentiles, matches, paginate};

/// In-memory [`Store`] implementation, for tests and local development.
///
/// Pagination and filtering mirror the semantics a SQL-backed store must
/// provide: newest-first ordering, a base64 opaque cursor, and every
/// [`ExecutionFilter`] predicate applied uniformly.
#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<(TenantId, WorkflowId), Workflow>>,
    versions: RwLock<HashMap<(TenantId, WorkflowId, i32), WorkflowVersion>>,
    executions: RwLock<HashMap<(TenantId, ExecutionId), Execution>>,
    steps: RwLock<HashMap<StepExecutionId, StepExecution>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_workflow(&self, workflow: Workflow) -> AppResult<()> {
        let key = (workflow.tenant_id(), workflow.id());
        self.workflows.write().await.insert(key, workflow);
        Ok(())
    }

    async fn get_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(&(tenant_id, workflow_id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("workflow {workflow_id} not found")))
    }

    async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let key = (workflow.tenant_id(), workflow.id());
        let mut workflows = self.workflows.write().await;
        if !workflows.contains_key(&key) {
            return Err(AppError::NotFound(format!("workflow {} not found", workflow.id())));
        }
        workflows.insert(key, workflow.clone());
        Ok(())
    }

    async fn delete_workflow(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()> {
        let removed = self.workflows.write().await.remove(&(tenant_id, workflow_id));
        if removed.is_none() {
            return Err(AppError::NotFound(format!("workflow {workflow_id} not found")));
        }
        self.versions.write().await.retain(|(version_tenant, version_workflow, _), _| {
            !(*version_tenant == tenant_id && *version_workflow == workflow_id)
        });
        Ok(())
    }

    async fn list_workflows(
        &self,
        tenant_id: TenantId,
        status: Option<WorkflowStatus>,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Workflow>> {
        let workflows = self.workflows.read().await;
        let rows = workflows
            .values()
            .filter(|workflow| workflow.tenant_id() == tenant_id)
            .filter(|workflow| status.is_none_or(|status| workflow.status() == status))
            .map(|workflow| (workflow.created_at(), workflow.id().as_uuid(), workflow.clone()))
            .collect();
        paginate(rows, cursor, limit)
    }

    async fn create_workflow_version(&self, version: WorkflowVersion) -> AppResult<()> {
        let tenant_id = self
            .workflows
            .read()
            .await
            .values()
            .find(|workflow| workflow.id() == version.workflow_id())
            .map(Workflow::tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("workflow {} not found", version.workflow_id())))?;
        let key = (tenant_id, version.workflow_id(), version.version());
        self.versions.write().await.insert(key, version);
        Ok(())
    }

    async fn get_workflow_version(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: i32,
    ) -> AppResult<WorkflowVersion> {
        self.versions
            .read()
            .await
            .get(&(tenant_id, workflow_id, version))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("workflow {workflow_id} version {version} not found")))
    }

    async fn list_workflow_versions(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Vec<WorkflowVersion>> {
        let mut versions: Vec<WorkflowVersion> = self
            .versions
            .read()
            .await
            .iter()
            .filter(|((version_tenant, version_workflow, _), _)| *version_tenant == tenant_id && *version_workflow == workflow_id)
            .map(|(_, version)| version.clone())
            .collect();
        versions.sort_by_key(WorkflowVersion::version);
        Ok(versions)
    }

    async fn create_execution(&self, execution: Execution) -> AppResult<()> {
        let key = (execution.tenant_id(), execution.id());
        self.executions.write().await.insert(key, execution);
        Ok(())
    }

    async fn get_execution(&self, tenant_id: TenantId, execution_id: ExecutionId) -> AppResult<Execution> {
        self.executions
            .read()
            .await
            .get(&(tenant_id, execution_id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("execution {execution_id} not found")))
    }

    async fn update_execution(&self, execution: &Execution) -> AppResult<()> {
        let key = (execution.tenant_id(), execution.id());
        let mut executions = self.executions.write().await;
        if !executions.contains_key(&key) {
            return Err(AppError::NotFound(format!("execution {} not found", execution.id())));
        }
        executions.insert(key, execution.clone());
        Ok(())
    }

    async fn create_step_execution(&self, step: StepExecution) -> AppResult<()> {
        self.steps.write().await.insert(step.id(), step);
        Ok(())
    }

    async fn update_step_execution(&self, step: &StepExecution) -> AppResult<()> {
        let mut steps = self.steps.write().await;
        if !steps.contains_key(&step.id()) {
            return Err(AppError::NotFound(format!("step execution {} not found", step.id())));
        }
        steps.insert(step.id(), step.clone());
        Ok(())
    }

    async fn list_step_executions(&self, tenant_id: TenantId, execution_id: ExecutionId) -> AppResult<Vec<StepExecution>> {
        if self.executions.read().await.get(&(tenant_id, execution_id)).is_none() {
            return Err(AppError::NotFound(format!("execution {execution_id} not found")));
        }
        let mut steps: Vec<StepExecution> = self
            .steps
            .read()
            .await
            .values()
            .filter(|step| step.execution_id() == execution_id)
            .cloned()
            .collect();
        steps.sort_by_key(StepExecution::started_at);
        Ok(steps)
    }

    async fn get_step_execution(&self, tenant_id: TenantId, step_id: StepExecutionId) -> AppResult<StepExecution> {
        let steps = self.steps.read().await;
        let step = steps.get(&step_id).ok_or_else(|| AppError::NotFound(format!("step execution {step_id} not found")))?;
        let executions = self.executions.read().await;
        if executions.get(&(tenant_id, step.execution_id())).is_none() {
            return Err(AppError::NotFound(format!("step execution {step_id} not found")));
        }
        Ok(step.clone())
    }

    async fn list_executions_filtered(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        cursor: Option<PaginationCursor>,
        limit: i64,
    ) -> AppResult<Page<Execution>> {
        filter.validate()?;
        let executions = self.executions.read().await;
        let rows = executions
            .values()
            .filter(|execution| execution.tenant_id() == tenant_id)
            .filter(|execution| matches(filter, execution))
            .map(|execution| (execution.created_at(), execution.id().as_uuid(), execution.clone()))
            .collect();
        paginate(rows, cursor, limit)
    }

    async fn count_executions(&self, tenant_id: TenantId, filter: &ExecutionFilter) -> AppResult<i64> {
        filter.validate()?;
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|execution| execution.tenant_id() == tenant_id)
            .filter(|execution| matches(filter, execution))
            .count() as i64)
    }

    async fn count_executions_by_status(
        &self,
        tenant_id: TenantId,
        filter: &ExecutionFilter,
        status: ExecutionStatus,
    ) -> AppResult<i64> {
        filter.validate()?;
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|execution| execution.tenant_id() == tenant_id)
            .filter(|execution| execution.status() == status)
            .filter(|execution| matches(filter, execution))
            .count() as i64)
    }

    async fn execution_trends(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: TrendGranularity,
    ) -> AppResult<Vec<ExecutionTrendBucket>> {
        let bucket_span = match granularity {
            TrendGranularity::Hour => Duration::hours(1),
            TrendGranularity::Day => Duration::days(1),
        };

        let executions = self.executions.read().await;
        let mut buckets: Vec<ExecutionTrendBucket> = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let bucket_end = cursor + bucket_span;
            let mut bucket = ExecutionTrendBucket { bucket: cursor, total: 0, success: 0, failed: 0 };
            for execution in executions.values() {
                if execution.tenant_id() != tenant_id || execution.created_at() < cursor || execution.created_at() >= bucket_end {
                    continue;
                }
                bucket.total += 1;
                match execution.status() {
                    ExecutionStatus::Completed => bucket.success += 1,
                    ExecutionStatus::Failed => bucket.failed += 1,
                    _ => {}
                }
            }
            buckets.push(bucket);
            cursor = bucket_end;
        }
        Ok(buckets)
    }

    async fn duration_stats(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowDurationStats>> {
        let executions = self.executions.read().await;
        let mut by_workflow: HashMap<WorkflowId, Vec<i64>> = HashMap::new();
        for execution in executions.values() {
            if execution.tenant_id() != tenant_id {
                continue;
            }
            if let (Some(started), Some(completed)) = (execution.started_at(), execution.completed_at()) {
                by_workflow.entry(execution.workflow_id()).or_default().push((completed - started).num_milliseconds());
            }
        }

        let mut stats: Vec<WorkflowDurationStats> = by_workflow
            .into_iter()
            .map(|(workflow_id, mut durations)| {
                let total_runs = durations.len() as i64;
                let (avg_ms, p50_ms, p90_ms, p99_ms) = duration_percentiles(&mut durations);
                WorkflowDurationStats { workflow_id, avg_ms, p50_ms, p90_ms, p99_ms, total_runs }
            })
            .collect();
        stats.sort_by_key(|entry| entry.workflow_id.as_uuid());
        Ok(stats)
    }

    async fn top_failures(&self, tenant_id: TenantId, limit: i64) -> AppResult<Vec<TopFailure>> {
        let executions = self.executions.read().await;
        let mut by_workflow: HashMap<WorkflowId, (i64, DateTime<Utc>, Option<String>)> = HashMap::new();
        for execution in executions.values() {
            if execution.tenant_id() != tenant_id || execution.status() != ExecutionStatus::Failed {
                continue;
            }
            let entry = by_workflow.entry(execution.workflow_id()).or_insert((0, execution.created_at(), None));
            entry.0 += 1;
            if execution.created_at() >= entry.1 {
                entry.1 = execution.created_at();
                entry.2 = execution.error_message().map(str::to_owned);
            }
        }

        let mut failures: Vec<TopFailure> = by_workflow
            .into_iter()
            .map(|(workflow_id, (failure_count, last_failed_at, last_error_message))| TopFailure {
                workflow_id,
                failure_count,
                last_failed_at,
                last_error_message,
            })
            .collect();
        failures.sort_by(|left, right| right.failure_count.cmp(&left.failure_count).then_with(|| right.last_failed_at.cmp(&left.last_failed_at)));
        failures.truncate(limit.max(0) as usize);
        Ok(failures)
    }

    async fn trigger_type_breakdown(&self, tenant_id: TenantId) -> AppResult<Vec<TriggerTypeBreakdown>> {
        let executions = self.executions.read().await;
        let mut counts: HashMap<String, i64> = HashMap::new();
        let mut total = 0i64;
        for execution in executions.values() {
            if execution.tenant_id() != tenant_id {
                continue;
            }
            *counts.entry(execution.trigger_type().to_owned()).or_default() += 1;
            total += 1;
        }

        let mut breakdown: Vec<TriggerTypeBreakdown> = counts
            .into_iter()
            .map(|(trigger_type, count)| TriggerTypeBreakdown {
                trigger_type,
                count,
                percentage: if total > 0 { (count as f64 / total as f64 * 10000.0).round() / 100.0 } else { 0.0 },
            })
            .collect();
        breakdown.sort_by(|left, right| right.count.cmp(&left.count).then_with(|| left.trigger_type.cmp(&right.trigger_type)));
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use orbitflow_domain::{ExecutionInput, WorkflowDefinition, WorkflowInput};
    use serde_json::json;

    use super::*;

    fn sample_workflow(tenant_id: TenantId) -> Workflow {
        let definition = WorkflowDefinition::new(Vec::new(), Vec::new()).unwrap_or_else(|_| unreachable!());
        let workflow = Workflow::new(WorkflowInput {
            tenant_id,
            name: "sample".to_owned(),
            description: None,
            definition,
            created_by: "tester".to_owned(),
            created_at: Utc::now(),
        });
        assert!(workflow.is_ok());
        workflow.unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn create_then_get_workflow_round_trips() {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new();
        let workflow = sample_workflow(tenant_id);
        let workflow_id = workflow.id();

        let create_result = store.create_workflow(workflow).await;
        assert!(create_result.is_ok());

        let fetched = store.get_workflow(tenant_id, workflow_id).await;
        assert!(fetched.is_ok());
    }

    #[tokio::test]
    async fn get_workflow_outside_tenant_is_not_found() {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new();
        let workflow = sample_workflow(tenant_id);
        let workflow_id = workflow.id();
        let create_result = store.create_workflow(workflow).await;
        assert!(create_result.is_ok());

        let result = store.get_workflow(TenantId::new(), workflow_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_workflow_makes_it_not_found() {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new();
        let workflow = sample_workflow(tenant_id);
        let workflow_id = workflow.id();
        let create_result = store.create_workflow(workflow).await;
        assert!(create_result.is_ok());

        let delete_result = store.delete_workflow(tenant_id, workflow_id).await;
        assert!(delete_result.is_ok());

        let result = store.get_workflow(tenant_id, workflow_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_executions_filtered_applies_status_predicate() {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new();
        let workflow_id = WorkflowId::new();

        let mut completed = Execution::new_pending(ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version: 1,
            trigger_type: "manual".to_owned(),
            trigger_data: json!({}),
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })
        .unwrap_or_else(|_| unreachable!());
        assert!(completed.start(Utc::now()).is_ok());
        assert!(completed.finish(ExecutionStatus::Completed, Some(json!({})), None, Utc::now()).is_ok());
        assert!(store.create_execution(completed).await.is_ok());

        let pending = Execution::new_pending(ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version: 1,
            trigger_type: "manual".to_owned(),
            trigger_data: json!({}),
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })
        .unwrap_or_else(|_| unreachable!());
        assert!(store.create_execution(pending).await.is_ok());

        let filter = ExecutionFilter { status: Some(ExecutionStatus::Completed), ..Default::default() };
        let page = store.list_executions_filtered(tenant_id, &filter, None, 10).await;
        assert!(page.is_ok());
        let page = page.unwrap_or_else(|_| unreachable!());
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_count, 1);
    }
}
