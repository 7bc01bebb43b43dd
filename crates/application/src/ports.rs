use async_trait::async_trait;
use orbitflow_core::{AppResult, ExecutionId, TenantId, WorkflowId};
use serde_json::Value;

/// Message published to an external execution queue (§6).
#[derive(Debug, Clone)]
pub struct ExecutionQueueMessage {
    /// Execution to run.
    pub execution_id: ExecutionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Workflow the execution runs.
    pub workflow_id: WorkflowId,
    /// Frozen workflow definition version.
    pub workflow_version: i32,
    /// Trigger type that started the execution.
    pub trigger_type: String,
    /// Trigger payload, when the transport carries it inline.
    pub trigger_data: Option<Value>,
}

/// Publishes executions to an external queue for out-of-process workers.
///
/// Transport is opaque to this port; `WorkflowService` falls back to
/// in-process execution whenever publishing fails.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publishes one execution message.
    async fn publish(&self, message: ExecutionQueueMessage) -> AppResult<()>;
}

/// Authentication a webhook trigger node expects on inbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAuthType {
    /// No authentication.
    None,
    /// HMAC request signature.
    Signature,
    /// HTTP basic authentication.
    Basic,
    /// Static API key header.
    ApiKey,
}

impl Default for WebhookAuthType {
    fn default() -> Self {
        Self::Signature
    }
}

/// One webhook-triggered node, as registered with an external collaborator.
#[derive(Debug, Clone)]
pub struct WebhookNode {
    /// Node id within the owning workflow's definition.
    pub node_id: String,
    /// Authentication the endpoint expects.
    pub auth_type: WebhookAuthType,
}

/// Synchronizes a workflow's webhook-triggered nodes with an external
/// registration system. Failures are logged by the service, never fatal.
#[async_trait]
pub trait WebhookSynchronizer: Send + Sync {
    /// Replaces the registered webhook nodes for a workflow.
    async fn sync_workflow_webhooks(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        nodes: Vec<WebhookNode>,
    ) -> AppResult<()>;

    /// Removes every webhook registration for a workflow.
    async fn delete_by_workflow_id(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()>;

    /// Returns the currently registered webhook nodes for a workflow.
    async fn get_by_workflow_id(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
    ) -> AppResult<Vec<WebhookNode>>;
}

/// One structured audit record of a mutating service operation.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Subject that performed the action.
    pub actor: String,
    /// Action name, e.g. `"workflow.create"`.
    pub action: String,
    /// Workflow the action applies to, when applicable.
    pub workflow_id: Option<WorkflowId>,
    /// Free-form structured detail.
    pub detail: Value,
}

/// Narrow port the service writes audit events through.
///
/// The engine owns this port but never ships a concrete external sink
/// (the audit-log *pipeline* is out of scope); recording what happened is
/// ambient observability the service always performs.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one audit event. Failures are logged, never fatal.
    async fn record(&self, event: AuditEvent) -> AppResult<()>;
}
