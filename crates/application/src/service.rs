use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use orbitflow_core::{AppError, AppResult, ExecutionId, TenantId, WorkflowId, clamp_list_limit};
use orbitflow_domain::{
    Edge, Execution, ExecutionInput, ExecutionStatus, Node, NodeKind, Workflow, WorkflowDefinition, WorkflowInput,
    WorkflowStatus, WorkflowVersion,
};
use orbitflow_runtime::Cancellation;
use serde_json::Value;

use crate::executor::Executor;
use crate::ports::{
    AuditEvent, AuditSink, ExecutionQueueMessage, QueuePublisher, WebhookAuthType, WebhookNode, WebhookSynchronizer,
};
use crate::store::Store;

/// Request payload for [`WorkflowService::create`].
#[derive(Debug, Clone)]
pub struct CreateWorkflowRequest {
    /// Workflow display name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Graph nodes.
    pub nodes: Vec<Node>,
    /// Graph edges.
    pub edges: Vec<Edge>,
    /// Subject performing the creation.
    pub created_by: String,
}

/// Request payload for [`WorkflowService::update`].
#[derive(Debug, Clone)]
pub struct UpdateWorkflowRequest {
    /// New display name.
    pub name: String,
    /// New description.
    pub description: Option<String>,
    /// New graph nodes, when the caller is changing the definition.
    pub nodes: Option<Vec<Node>>,
    /// New graph edges, when the caller is changing the definition.
    pub edges: Option<Vec<Edge>>,
    /// Subject performing the update.
    pub updated_by: String,
}

/// Aggregate execution counts returned by [`WorkflowService::execution_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStats {
    /// Executions matching the filter across every status.
    pub total: i64,
    /// Per-status breakdown.
    pub status_counts: HashMap<ExecutionStatus, i64>,
}

pub(crate) fn webhook_nodes_of(definition: &WorkflowDefinition) -> Vec<WebhookNode> {
    definition
        .nodes()
        .iter()
        .filter(|node| node.kind == NodeKind::TriggerWebhook)
        .map(|node| WebhookNode {
            node_id: node.id.clone(),
            auth_type: WebhookAuthType::default(),
        })
        .collect()
}

/// Public facade over workflow CRUD, execution, and version restore (§4.2).
pub struct WorkflowService {
    store: Arc<dyn Store>,
    executor: Arc<Executor>,
    queue_publisher: Option<Arc<dyn QueuePublisher>>,
    webhook_synchronizer: Option<Arc<dyn WebhookSynchronizer>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl WorkflowService {
    /// Creates a service with no optional collaborators attached.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, executor: Arc<Executor>) -> Self {
        Self {
            store,
            executor,
            queue_publisher: None,
            webhook_synchronizer: None,
            audit_sink: None,
        }
    }

    /// Attaches an external queue publisher for `Execute`.
    #[must_use]
    pub fn with_queue_publisher(mut self, publisher: Arc<dyn QueuePublisher>) -> Self {
        self.queue_publisher = Some(publisher);
        self
    }

    /// Attaches a webhook synchronizer, invoked on create/update/delete/restore.
    #[must_use]
    pub fn with_webhook_synchronizer(mut self, synchronizer: Arc<dyn WebhookSynchronizer>) -> Self {
        self.webhook_synchronizer = Some(synchronizer);
        self
    }

    /// Attaches an audit sink, invoked on every mutating operation.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    async fn audit(&self, tenant_id: TenantId, actor: &str, action: &str, workflow_id: Option<WorkflowId>, detail: Value) {
        let Some(sink) = &self.audit_sink else { return };
        let event = AuditEvent {
            tenant_id,
            actor: actor.to_owned(),
            action: action.to_owned(),
            workflow_id,
            detail,
        };
        if let Err(error) = sink.record(event).await {
            tracing::warn!(%error, action, "failed to record audit event");
        }
    }

    async fn resync_webhooks(&self, tenant_id: TenantId, workflow_id: WorkflowId, definition: &WorkflowDefinition) {
        let Some(synchronizer) = &self.webhook_synchronizer else {
            return;
        };
        let nodes = webhook_nodes_of(definition);
        if let Err(error) = synchronizer.sync_workflow_webhooks(tenant_id, workflow_id, nodes).await {
            tracing::warn!(%error, %workflow_id, "failed to sync workflow webhooks");
        }
    }

    /// Creates a workflow in draft status.
    pub async fn create(&self, tenant_id: TenantId, request: CreateWorkflowRequest) -> AppResult<Workflow> {
        let definition = WorkflowDefinition::new(request.nodes, request.edges)?;
        let now = Utc::now();
        let workflow = Workflow::new(WorkflowInput {
            tenant_id,
            name: request.name,
            description: request.description,
            definition,
            created_by: request.created_by.clone(),
            created_at: now,
        })?;

        self.store.create_workflow(workflow.clone()).await?;
        self.resync_webhooks(tenant_id, workflow.id(), workflow.definition()).await;
        self.audit(
            tenant_id,
            &request.created_by,
            "workflow.create",
            Some(workflow.id()),
            serde_json::json!({ "name": workflow.name() }),
        )
        .await;

        Ok(workflow)
    }

    /// Updates a workflow's metadata and, optionally, its definition.
    ///
    /// A definition change writes a [`WorkflowVersion`] snapshot of the
    /// *pre-update* definition at the new version number, so restore is
    /// deterministic.
    pub async fn update(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        request: UpdateWorkflowRequest,
    ) -> AppResult<Workflow> {
        let mut workflow = self.store.get_workflow(tenant_id, workflow_id).await?;
        let now = Utc::now();

        if let (Some(nodes), Some(edges)) = (request.nodes, request.edges) {
            let new_definition = WorkflowDefinition::new(nodes, edges)?;
            if new_definition != *workflow.definition() {
                let new_version_number = workflow.version() + 1;
                let pre_update_definition = workflow.definition().clone();
                workflow.replace_definition(new_definition, now)?;

                let snapshot = WorkflowVersion::new(
                    workflow.id(),
                    new_version_number,
                    pre_update_definition,
                    request.updated_by.clone(),
                    now,
                );
                self.store.create_workflow_version(snapshot).await?;
            }
        }

        workflow.update_metadata(request.name, request.description, now)?;
        self.store.update_workflow(&workflow).await?;
        self.resync_webhooks(tenant_id, workflow.id(), workflow.definition()).await;
        self.audit(
            tenant_id,
            &request.updated_by,
            "workflow.update",
            Some(workflow.id()),
            serde_json::json!({ "version": workflow.version() }),
        )
        .await;

        Ok(workflow)
    }

    /// Soft-deletes a workflow, removing its webhook registrations first.
    pub async fn delete(&self, tenant_id: TenantId, workflow_id: WorkflowId, actor: &str) -> AppResult<()> {
        let mut workflow = self.store.get_workflow(tenant_id, workflow_id).await?;

        if let Some(synchronizer) = &self.webhook_synchronizer
            && let Err(error) = synchronizer.delete_by_workflow_id(tenant_id, workflow_id).await
        {
            tracing::warn!(%error, %workflow_id, "failed to delete workflow webhooks");
        }

        workflow.archive(Utc::now());
        self.store.update_workflow(&workflow).await?;
        self.audit(tenant_id, actor, "workflow.delete", Some(workflow_id), Value::Null).await;
        Ok(())
    }

    /// Starts a new execution of an active workflow.
    ///
    /// Publishes to the queue collaborator when attached; falls back to an
    /// in-process executor task on publish failure or when no queue is
    /// attached.
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        trigger_type: String,
        trigger_data: Value,
    ) -> AppResult<Execution> {
        let workflow = self.store.get_workflow(tenant_id, workflow_id).await?;
        if workflow.status() != WorkflowStatus::Active {
            return Err(AppError::Validation(format!(
                "workflow {workflow_id} is not active"
            )));
        }

        let execution = Execution::new_pending(ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version: workflow.version(),
            trigger_type: trigger_type.clone(),
            trigger_data: trigger_data.clone(),
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })?;
        self.store.create_execution(execution.clone()).await?;

        if let Some(publisher) = &self.queue_publisher {
            let message = ExecutionQueueMessage {
                execution_id: execution.id(),
                tenant_id,
                workflow_id,
                workflow_version: workflow.version(),
                trigger_type,
                trigger_data: Some(trigger_data),
            };
            match publisher.publish(message).await {
                Ok(()) => return Ok(execution),
                Err(error) => {
                    tracing::warn!(%error, "queue publish failed, falling back to in-process execution");
                }
            }
        }

        self.spawn_execution(tenant_id, execution.id());
        Ok(execution)
    }

    /// Starts an execution and awaits its completion, reloading the final record.
    pub async fn execute_sync(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        trigger_type: String,
        trigger_data: Value,
    ) -> AppResult<Execution> {
        let workflow = self.store.get_workflow(tenant_id, workflow_id).await?;
        if workflow.status() != WorkflowStatus::Active {
            return Err(AppError::Validation(format!(
                "workflow {workflow_id} is not active"
            )));
        }

        let execution = Execution::new_pending(ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version: workflow.version(),
            trigger_type,
            trigger_data,
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })?;
        self.store.create_execution(execution.clone()).await?;

        self.executor
            .run(tenant_id, execution.id(), Cancellation::new())
            .await?;

        self.store.get_execution(tenant_id, execution.id()).await
    }

    fn spawn_execution(&self, tenant_id: TenantId, execution_id: ExecutionId) {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            if let Err(error) = executor.run(tenant_id, execution_id, Cancellation::new()).await {
                tracing::error!(%error, %execution_id, "execution task failed");
            }
        });
    }

    /// Sums execution counts over every known status for `filter`.
    pub async fn execution_stats(
        &self,
        tenant_id: TenantId,
        filter: &orbitflow_domain::ExecutionFilter,
    ) -> AppResult<ExecutionStats> {
        filter.validate()?;

        let statuses = [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ];

        let mut status_counts = HashMap::with_capacity(statuses.len());
        let mut total = 0;
        for status in statuses {
            let count = self.store.count_executions_by_status(tenant_id, filter, status).await?;
            total += count;
            status_counts.insert(status, count);
        }

        Ok(ExecutionStats { total, status_counts })
    }

    /// Restores a workflow's definition to a previously saved version.
    ///
    /// Writes a fresh version row rather than mutating history, per the
    /// invariant that version rows are immutable once written.
    pub async fn restore(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        version: i32,
        actor: &str,
    ) -> AppResult<Workflow> {
        let snapshot = self.store.get_workflow_version(tenant_id, workflow_id, version).await?;
        let mut workflow = self.store.get_workflow(tenant_id, workflow_id).await?;
        let now = Utc::now();

        let new_version_number = workflow.version() + 1;
        workflow.replace_definition(snapshot.definition().clone(), now)?;

        let new_snapshot = WorkflowVersion::new(
            workflow.id(),
            new_version_number,
            snapshot.definition().clone(),
            actor.to_owned(),
            now,
        );
        self.store.create_workflow_version(new_snapshot).await?;
        self.store.update_workflow(&workflow).await?;
        self.resync_webhooks(tenant_id, workflow.id(), workflow.definition()).await;
        self.audit(
            tenant_id,
            actor,
            "workflow.restore",
            Some(workflow_id),
            serde_json::json!({ "restored_version": version }),
        )
        .await;

        Ok(workflow)
    }

    /// Caps a caller-supplied list limit into the service's allowed range.
    #[must_use]
    pub fn clamp_limit(requested: i64) -> i64 {
        clamp_list_limit(requested)
    }
}
