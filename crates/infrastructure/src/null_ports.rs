use std::collections::HashMap;

use async_trait::async_trait;
use orbitflow_application::{
    AuditEvent, AuditSink, ExecutionQueueMessage, QueuePublisher, WebhookNode, WebhookSynchronizer,
};
use orbitflow_core::{AppResult, TenantId, WorkflowId};
use tokio::sync::Mutex;

/// [`QueuePublisher`] that drops every message, always reporting failure.
///
/// `WorkflowService` falls back to in-process execution whenever publish
/// fails, so this is the right default until a queue transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueuePublisher;

#[async_trait]
impl QueuePublisher for NullQueuePublisher {
    async fn publish(&self, _message: ExecutionQueueMessage) -> AppResult<()> {
        Err(orbitflow_core::AppError::Internal(
            "no queue transport configured".to_owned(),
        ))
    }
}

/// [`WebhookSynchronizer`] that performs no external registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWebhookSynchronizer;

#[async_trait]
impl WebhookSynchronizer for NullWebhookSynchronizer {
    async fn sync_workflow_webhooks(
        &self,
        _tenant_id: TenantId,
        _workflow_id: WorkflowId,
        _nodes: Vec<WebhookNode>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn delete_by_workflow_id(&self, _tenant_id: TenantId, _workflow_id: WorkflowId) -> AppResult<()> {
        Ok(())
    }

    async fn get_by_workflow_id(&self, _tenant_id: TenantId, _workflow_id: WorkflowId) -> AppResult<Vec<WebhookNode>> {
        Ok(Vec::new())
    }
}

/// [`WebhookSynchronizer`] test double that records registrations in memory.
#[derive(Debug, Default)]
pub struct RecordingWebhookSynchronizer {
    registered: Mutex<HashMap<(TenantId, WorkflowId), Vec<WebhookNode>>>,
}

impl RecordingWebhookSynchronizer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookSynchronizer for RecordingWebhookSynchronizer {
    async fn sync_workflow_webhooks(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        nodes: Vec<WebhookNode>,
    ) -> AppResult<()> {
        self.registered.lock().await.insert((tenant_id, workflow_id), nodes);
        Ok(())
    }

    async fn delete_by_workflow_id(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<()> {
        self.registered.lock().await.remove(&(tenant_id, workflow_id));
        Ok(())
    }

    async fn get_by_workflow_id(&self, tenant_id: TenantId, workflow_id: WorkflowId) -> AppResult<Vec<WebhookNode>> {
        Ok(self.registered.lock().await.get(&(tenant_id, workflow_id)).cloned().unwrap_or_default())
    }
}

/// [`AuditSink`] that writes each event to the tracing log, for deployments
/// with no external audit pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> AppResult<()> {
        tracing::info!(
            tenant_id = %event.tenant_id.as_uuid(),
            actor = %event.actor,
            action = %event.action,
            workflow_id = ?event.workflow_id.map(|id| id.as_uuid()),
            detail = %event.detail,
            "audit event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use orbitflow_application::WebhookAuthType;

    use super::*;

    #[tokio::test]
    async fn null_queue_publisher_always_fails() {
        let publisher = NullQueuePublisher;
        let message = ExecutionQueueMessage {
            execution_id: orbitflow_core::ExecutionId::new(),
            tenant_id: TenantId::new(),
            workflow_id: WorkflowId::new(),
            workflow_version: 1,
            trigger_type: "manual".to_owned(),
            trigger_data: None,
        };
        let result = publisher.publish(message).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn recording_webhook_synchronizer_round_trips() {
        let synchronizer = RecordingWebhookSynchronizer::new();
        let tenant_id = TenantId::new();
        let workflow_id = WorkflowId::new();
        let nodes = vec![WebhookNode { node_id: "trigger-1".to_owned(), auth_type: WebhookAuthType::ApiKey }];

        let sync_result = synchronizer.sync_workflow_webhooks(tenant_id, workflow_id, nodes.clone()).await;
        assert!(sync_result.is_ok());

        let fetched = synchronizer.get_by_workflow_id(tenant_id, workflow_id).await;
        assert!(fetched.is_ok());
        assert_eq!(fetched.unwrap_or_default().len(), nodes.len());

        let delete_result = synchronizer.delete_by_workflow_id(tenant_id, workflow_id).await;
        assert!(delete_result.is_ok());
        let after_delete = synchronizer.get_by_workflow_id(tenant_id, workflow_id).await;
        assert!(after_delete.is_ok());
        assert!(after_delete.unwrap_or_default().is_empty());
    }
}
