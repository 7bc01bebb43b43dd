use std::sync::Arc;

use chrono::Utc;
use orbitflow_core::{AppResult, TenantId, WorkflowId};
use orbitflow_domain::{Workflow, WorkflowInput};
use serde_json::Value;

use crate::ports::{AuditEvent, AuditSink, WebhookSynchronizer};
use crate::store::Store;

/// One id's failure within a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    /// Workflow the operation failed for.
    pub workflow_id: WorkflowId,
    /// Human-readable failure reason.
    pub error: String,
}

/// Outcome of a batched operation across many workflow ids (§6).
///
/// Every id is attempted independently; one id's failure never aborts the
/// rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkResult {
    /// Number of ids the operation completed successfully.
    pub success_count: usize,
    /// Ids that failed, with the reason.
    pub failures: Vec<BulkFailure>,
}

impl BulkResult {
    fn new() -> Self {
        Self {
            success_count: 0,
            failures: Vec::new(),
        }
    }

    fn push(&mut self, outcome: AppResult<()>, workflow_id: WorkflowId) {
        match outcome {
            Ok(()) => self.success_count += 1,
            Err(error) => self.failures.push(BulkFailure {
                workflow_id,
                error: error.to_string(),
            }),
        }
    }
}

/// One exported workflow: the fields `BulkExport` returns and `Create`
/// accepts, so an export can round-trip through re-import unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedWorkflow {
    /// Display name at export time.
    pub name: String,
    /// Description at export time.
    pub description: Option<String>,
    /// Graph definition at export time, serialized for transport.
    pub definition: Value,
}

/// Batched workflow operations reporting per-item success/failure (§6).
///
/// Holds no state of its own; every method reads and writes through the
/// collaborators passed at construction, matching `WorkflowService`'s
/// dependency shape.
pub struct BulkOperations {
    store: Arc<dyn Store>,
    webhook_synchronizer: Option<Arc<dyn WebhookSynchronizer>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl BulkOperations {
    /// Creates a bulk-operations facade with no optional collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            webhook_synchronizer: None,
            audit_sink: None,
        }
    }

    /// Attaches a webhook synchronizer, invoked on delete/enable/disable.
    #[must_use]
    pub fn with_webhook_synchronizer(mut self, synchronizer: Arc<dyn WebhookSynchronizer>) -> Self {
        self.webhook_synchronizer = Some(synchronizer);
        self
    }

    /// Attaches an audit sink, invoked once per id.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    async fn audit(&self, tenant_id: TenantId, actor: &str, action: &str, workflow_id: WorkflowId) {
        let Some(sink) = &self.audit_sink else { return };
        let event = AuditEvent {
            tenant_id,
            actor: actor.to_owned(),
            action: action.to_owned(),
            workflow_id: Some(workflow_id),
            detail: Value::Null,
        };
        if let Err(error) = sink.record(event).await {
            tracing::warn!(%error, action, "failed to record audit event");
        }
    }

    /// Permanently removes each workflow and its webhook registrations.
    ///
    /// Unlike the single-workflow `delete` service operation (which
    /// archives), a bulk-deleted id subsequently resolves as `NotFound`.
    pub async fn delete(&self, tenant_id: TenantId, actor: &str, workflow_ids: &[WorkflowId]) -> BulkResult {
        let mut result = BulkResult::new();
        for &workflow_id in workflow_ids {
            let outcome = self.delete_one(tenant_id, workflow_id).await;
            if outcome.is_ok() {
                self.audit(tenant_id, actor, "workflow.bulk_delete", workflow_id).await;
            }
            result.push(outcome, workflow_id);
        }
        result
    }

    async fn delete_one(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()> {
        self.store.get_workflow(tenant_id, workflow_id).await?;
        if let Some(synchronizer) = &self.webhook_synchronizer
            && let Err(error) = synchronizer.delete_by_workflow_id(tenant_id, workflow_id).await
        {
            tracing::warn!(%error, %workflow_id, "failed to delete workflow webhooks");
        }
        self.store.delete_workflow(tenant_id, workflow_id).await
    }

    /// Activates each workflow.
    pub async fn enable(&self, tenant_id: TenantId, actor: &str, workflow_ids: &[WorkflowId]) -> BulkResult {
        self.set_status(tenant_id, actor, workflow_ids, "workflow.bulk_enable", |workflow, now| {
            workflow.activate(now)
        })
        .await
    }

    /// Deactivates each workflow.
    pub async fn disable(&self, tenant_id: TenantId, actor: &str, workflow_ids: &[WorkflowId]) -> BulkResult {
        self.set_status(tenant_id, actor, workflow_ids, "workflow.bulk_disable", |workflow, now| {
            workflow.deactivate(now)
        })
        .await
    }

    async fn set_status(
        &self,
        tenant_id: TenantId,
        actor: &str,
        workflow_ids: &[WorkflowId],
        action: &str,
        transition: impl Fn(&mut Workflow, chrono::DateTime<Utc>) -> AppResult<()>,
    ) -> BulkResult {
        let mut result = BulkResult::new();
        for &workflow_id in workflow_ids {
            let outcome = self.transition_one(tenant_id, workflow_id, &transition).await;
            if outcome.is_ok() {
                self.audit(tenant_id, actor, action, workflow_id).await;
            }
            result.push(outcome, workflow_id);
        }
        result
    }

    async fn transition_one(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        transition: &impl Fn(&mut Workflow, chrono::DateTime<Utc>) -> AppResult<()>,
    ) -> AppResult<()> {
        let mut workflow = self.store.get_workflow(tenant_id, workflow_id).await?;
        transition(&mut workflow, Utc::now())?;
        self.store.update_workflow(&workflow).await
    }

    /// Exports each workflow's name, description, and definition.
    ///
    /// Ids that fail to load are reported as failures; successfully
    /// exported workflows are returned alongside the batch result.
    pub async fn export(
        &self,
        tenant_id: TenantId,
        workflow_ids: &[WorkflowId],
    ) -> (BulkResult, Vec<ExportedWorkflow>) {
        let mut result = BulkResult::new();
        let mut exported = Vec::new();
        for &workflow_id in workflow_ids {
            match self.store.get_workflow(tenant_id, workflow_id).await {
                Ok(workflow) => {
                    exported.push(ExportedWorkflow {
                        name: workflow.name().to_owned(),
                        description: workflow.description().map(str::to_owned),
                        definition: serde_json::json!({
                            "nodes": workflow.definition().nodes(),
                            "edges": workflow.definition().edges(),
                        }),
                    });
                    result.push(Ok(()), workflow_id);
                }
                Err(error) => result.push(Err(error), workflow_id),
            }
        }
        (result, exported)
    }

    /// Clones each workflow with name suffix `" (Copy)"`, starting the copy
    /// in `draft` status regardless of the source's status.
    ///
    /// Webhook secrets are not carried over: a clone's webhook nodes, if
    /// any, get freshly registered secrets rather than reusing the
    /// source's.
    pub async fn clone_workflows(
        &self,
        tenant_id: TenantId,
        actor: &str,
        workflow_ids: &[WorkflowId],
    ) -> BulkResult {
        let mut result = BulkResult::new();
        for &workflow_id in workflow_ids {
            let outcome = self.clone_one(tenant_id, actor, workflow_id).await;
            if let Ok(Some(clone_id)) = &outcome {
                self.audit(tenant_id, actor, "workflow.bulk_clone", *clone_id).await;
            }
            result.push(outcome.map(|_| ()), workflow_id);
        }
        result
    }

    async fn clone_one(
        &self,
        tenant_id: TenantId,
        actor: &str,
        workflow_id: WorkflowId,
    ) -> AppResult<Option<WorkflowId>> {
        let source = self.store.get_workflow(tenant_id, workflow_id).await?;
        let now = Utc::now();
        let clone = Workflow::new(WorkflowInput {
            tenant_id,
            name: format!("{} (Copy)", source.name()),
            description: source.description().map(str::to_owned),
            definition: source.definition().clone(),
            created_by: actor.to_owned(),
            created_at: now,
        })?;
        let clone_id = clone.id();
        self.store.create_workflow(clone.clone()).await?;

        if let Some(synchronizer) = &self.webhook_synchronizer {
            let nodes = crate::service::webhook_nodes_of(clone.definition());
            if !nodes.is_empty()
                && let Err(error) = synchronizer.sync_workflow_webhooks(tenant_id, clone_id, nodes).await
            {
                tracing::warn!(%error, workflow_id = %clone_id, "failed to register cloned workflow's webhooks");
            }
        }

        Ok(Some(clone_id))
    }
}
