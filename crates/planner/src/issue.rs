use serde::{Deserialize, Serialize};

/// One dry-run error or warning, scoped to the config field (and, when
/// applicable, the node) that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunIssue {
    /// Node the issue applies to, absent for graph-wide issues (e.g. a cycle).
    pub node_id: Option<String>,
    /// Config field name the issue applies to, e.g. `"mapping"` or `"edges"`.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl DryRunIssue {
    /// Creates a node-scoped issue.
    #[must_use]
    pub fn on_node(node_id: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a graph-wide issue with no specific node.
    #[must_use]
    pub fn on_graph(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: None,
            field: field.into(),
            message: message.into(),
        }
    }
}
