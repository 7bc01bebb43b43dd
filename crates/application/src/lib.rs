//! Application services: workflow CRUD, execution orchestration, bulk
//! operations, and log export, built on the [`Store`] and port traits.

#![forbid(unsafe_code)]

mod bulk;
mod executor;
mod log_export;
mod ports;
mod service;
mod store;

pub use bulk::{BulkFailure, BulkOperations, BulkResult, ExportedWorkflow};
pub use executor::Executor;
pub use log_export::{export, LogFormat};
pub use ports::{
    AuditEvent, AuditSink, ExecutionQueueMessage, QueuePublisher, WebhookAuthType, WebhookNode,
    WebhookSynchronizer,
};
pub use service::{CreateWorkflowRequest, ExecutionStats, UpdateWorkflowRequest, WorkflowService};
pub use store::{
    ExecutionTrendBucket, Page, Store, TopFailure, TrendGranularity, TriggerTypeBreakdown,
    WorkflowDurationStats,
};
