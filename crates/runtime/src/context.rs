use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use orbitflow_core::{ExecutionId, TenantId};
use orbitflow_expression::Evaluator;

/// Cooperative cancellation flag shared by every node invocation within one
/// execution.
///
/// Checked before each node invocation and honored inside suspension points
/// (HTTP requests, `control:delay`, sub-workflow sync waits) per §5.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a not-yet-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the execution as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation context passed to a [`crate::NodeExecutor`].
#[derive(Clone)]
pub struct NodeContext {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Execution this node invocation belongs to.
    pub execution_id: ExecutionId,
    /// Node being invoked.
    pub node_id: String,
    /// Shared expression evaluator, carrying the cross-execution compile cache.
    pub evaluator: Arc<Evaluator>,
    /// HTTP client reused across `action:http` invocations.
    pub http_client: reqwest::Client,
    /// Cancellation flag for the owning execution.
    pub cancellation: Cancellation,
}
