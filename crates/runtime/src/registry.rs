use std::collections::HashMap;
use std::sync::Arc;

use orbitflow_domain::NodeKind;

use crate::conditional::ConditionalExecutor;
use crate::delay::DelayExecutor;
use crate::formula::FormulaActionExecutor;
use crate::http::HttpActionExecutor;
use crate::loop_source::LoopSourceExecutor;
use crate::node_executor::NodeExecutor;
use crate::transform::TransformActionExecutor;
use crate::trigger::TriggerPassthroughExecutor;

/// Maps self-contained node kinds to their handlers.
///
/// Multi-step control-flow kinds (loop iteration, parallel/fork/join,
/// sub_workflow, try/catch/finally, retry, circuit_breaker) have no entry
/// here: the executor orchestrates them directly, dispatching into this
/// registry only for the leaf work each step performs.
#[derive(Clone)]
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    /// Builds the registry with every leaf node kind wired to its handler.
    #[must_use]
    pub fn new() -> Self {
        let mut handlers: HashMap<NodeKind, Arc<dyn NodeExecutor>> = HashMap::new();
        handlers.insert(NodeKind::TriggerWebhook, Arc::new(TriggerPassthroughExecutor));
        handlers.insert(NodeKind::TriggerSchedule, Arc::new(TriggerPassthroughExecutor));
        handlers.insert(NodeKind::ActionHttp, Arc::new(HttpActionExecutor));
        handlers.insert(NodeKind::ActionTransform, Arc::new(TransformActionExecutor));
        handlers.insert(NodeKind::ActionFormula, Arc::new(FormulaActionExecutor));
        handlers.insert(NodeKind::ControlIf, Arc::new(ConditionalExecutor));
        handlers.insert(NodeKind::ControlLoop, Arc::new(LoopSourceExecutor));
        handlers.insert(NodeKind::ControlDelay, Arc::new(DelayExecutor));
        Self { handlers }
    }

    /// Looks up the handler for `kind`, if this registry carries one.
    #[must_use]
    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeExecutor>> {
        self.handlers.get(&kind).cloned()
    }

    /// Returns whether `kind` is orchestrated by the executor rather than a
    /// single registered handler.
    #[must_use]
    pub fn is_executor_driven(kind: NodeKind) -> bool {
        matches!(
            kind,
            NodeKind::ControlParallel
                | NodeKind::ControlFork
                | NodeKind::ControlJoin
                | NodeKind::ControlSubWorkflow
                | NodeKind::ControlTry
                | NodeKind::ControlCatch
                | NodeKind::ControlFinally
                | NodeKind::ControlRetry
                | NodeKind::ControlCircuitBreaker
        )
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_kinds_have_handlers() {
        let registry = NodeRegistry::new();
        assert!(registry.get(NodeKind::ActionHttp).is_some());
        assert!(registry.get(NodeKind::ControlDelay).is_some());
    }

    #[test]
    fn control_flow_kinds_have_no_handler() {
        let registry = NodeRegistry::new();
        assert!(registry.get(NodeKind::ControlParallel).is_none());
        assert!(NodeRegistry::is_executor_driven(NodeKind::ControlParallel));
    }
}
