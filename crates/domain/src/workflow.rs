use chrono::{DateTime, Utc};
use orbitflow_core::{AppError, AppResult, NonEmptyString, TenantId, WorkflowId, WorkflowVersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Kind of a single workflow graph node.
///
/// Trigger kinds start an execution; action and control kinds are driven by
/// the planner's topological order once the execution is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Inbound webhook call starts the execution.
    TriggerWebhook,
    /// Cron-style schedule starts the execution.
    TriggerSchedule,
    /// Outbound HTTP call.
    ActionHttp,
    /// Reshapes data via a mapping expression.
    ActionTransform,
    /// Evaluates a formula expression against the environment.
    ActionFormula,
    /// Branches on a boolean expression.
    ControlIf,
    /// Repeats its body over a collection.
    ControlLoop,
    /// Starts concurrent branches.
    ControlParallel,
    /// Forks into named concurrent branches.
    ControlFork,
    /// Joins previously forked branches.
    ControlJoin,
    /// Suspends the execution for a fixed duration.
    ControlDelay,
    /// Invokes another workflow as a nested execution.
    ControlSubWorkflow,
    /// Guards a body, routing failures to a catch branch.
    ControlTry,
    /// Handles a failure raised by a guarded try body.
    ControlCatch,
    /// Always runs after a try/catch pair completes.
    ControlFinally,
    /// Wraps its body with a retry strategy.
    ControlRetry,
    /// Wraps its body with a circuit breaker.
    ControlCircuitBreaker,
}

impl NodeKind {
    /// Returns whether this kind starts an execution rather than being
    /// driven by the planner's topological order.
    #[must_use]
    pub fn is_trigger(self) -> bool {
        matches!(self, Self::TriggerWebhook | Self::TriggerSchedule)
    }
}

/// 2D canvas position of a node, carried for editor round-tripping only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier, unique within its workflow definition.
    pub id: String,
    /// Node kind, determines which executor runs it.
    pub kind: NodeKind,
    /// User-facing node label.
    pub name: String,
    /// Canvas position.
    pub position: Position,
    /// Node-kind-specific configuration, validated by the planner.
    pub config: Value,
    /// Credential reference used by action nodes that call external systems.
    pub credential_id: Option<String>,
}

/// Directed edge connecting two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier, unique within its workflow definition.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Optional branch label, e.g. `"true"`/`"false"` for `control_if`.
    pub label: Option<String>,
}

/// Validated workflow graph: nodes plus the edges connecting them.
///
/// Acyclicity is enforced by the planner's dry-run validation, not by this
/// constructor, since it requires a full topological walk rather than a
/// local structural check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl WorkflowDefinition {
    /// Creates a validated workflow definition from its nodes and edges.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> AppResult<Self> {
        let mut seen_node_ids = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if node.id.trim().is_empty() {
                return Err(AppError::Validation(
                    "node id must not be empty".to_owned(),
                ));
            }

            if !seen_node_ids.insert(node.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        let mut seen_edge_ids = HashSet::with_capacity(edges.len());
        for edge in &edges {
            if !seen_edge_ids.insert(edge.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate edge id: {}",
                    edge.id
                )));
            }

            if !seen_node_ids.contains(edge.source.as_str()) {
                return Err(AppError::Validation(format!(
                    "edge {} references unknown source node {}",
                    edge.id, edge.source
                )));
            }

            if !seen_node_ids.contains(edge.target.as_str()) {
                return Err(AppError::Validation(format!(
                    "edge {} references unknown target node {}",
                    edge.id, edge.target
                )));
            }
        }

        if !nodes.iter().any(|node| node.kind.is_trigger()) {
            return Err(AppError::Validation(
                "workflow definition requires at least one trigger node".to_owned(),
            ));
        }

        Ok(Self { nodes, edges })
    }

    /// Returns the graph's nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the graph's edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Returns edges whose source is the given node id.
    #[must_use]
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|edge| edge.source == node_id)
            .collect()
    }
}

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Editable, cannot be executed.
    Draft,
    /// Executable and eligible for triggers.
    Active,
    /// Executable history preserved, but triggers are suspended.
    Inactive,
    /// Soft-deleted; excluded from default listings and triggers.
    Archived,
}

impl WorkflowStatus {
    /// Returns whether a workflow in this status may start a new execution.
    #[must_use]
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Input payload used to construct a new workflow.
#[derive(Debug, Clone)]
pub struct WorkflowInput {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// User-facing workflow name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Initial graph definition.
    pub definition: WorkflowDefinition,
    /// Subject that created the workflow.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    id: WorkflowId,
    tenant_id: TenantId,
    name: NonEmptyString,
    description: Option<String>,
    definition: WorkflowDefinition,
    status: WorkflowStatus,
    version: i32,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new, draft-status workflow at version 1.
    pub fn new(input: WorkflowInput) -> AppResult<Self> {
        let WorkflowInput {
            tenant_id,
            name,
            description,
            definition,
            created_by,
            created_at,
        } = input;

        Ok(Self {
            id: WorkflowId::new(),
            tenant_id,
            name: NonEmptyString::new(name)?,
            description,
            definition,
            status: WorkflowStatus::Draft,
            version: 1,
            created_by,
            created_at,
            updated_at: created_at,
        })
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    /// Returns the owning tenant id.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the workflow description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the current graph definition.
    #[must_use]
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Returns the current definition version.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the subject that created the workflow.
    #[must_use]
    pub fn created_by(&self) -> &str {
        self.created_by.as_str()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last-modified timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Updates the display name and description in place.
    pub fn update_metadata(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status == WorkflowStatus::Archived {
            return Err(AppError::Conflict(
                "cannot modify an archived workflow".to_owned(),
            ));
        }

        self.name = NonEmptyString::new(name)?;
        self.description = description;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the graph definition, bumping the version by one.
    ///
    /// Returns the replaced definition paired with the version it was
    /// saved under, so a caller can persist a [`WorkflowVersion`] snapshot.
    pub fn replace_definition(
        &mut self,
        definition: WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status == WorkflowStatus::Archived {
            return Err(AppError::Conflict(
                "cannot modify an archived workflow".to_owned(),
            ));
        }

        self.definition = definition;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Activates the workflow, making it eligible for triggers.
    pub fn activate(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status == WorkflowStatus::Archived {
            return Err(AppError::Conflict(
                "cannot activate an archived workflow".to_owned(),
            ));
        }

        self.status = WorkflowStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Deactivates the workflow, suspending triggers without losing history.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status == WorkflowStatus::Archived {
            return Err(AppError::Conflict(
                "cannot deactivate an archived workflow".to_owned(),
            ));
        }

        self.status = WorkflowStatus::Inactive;
        self.updated_at = now;
        Ok(())
    }

    /// Soft-deletes the workflow.
    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.status = WorkflowStatus::Archived;
        self.updated_at = now;
    }

    /// Restores an archived workflow back to draft status.
    pub fn restore(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != WorkflowStatus::Archived {
            return Err(AppError::Conflict(
                "only an archived workflow can be restored".to_owned(),
            ));
        }

        self.status = WorkflowStatus::Draft;
        self.updated_at = now;
        Ok(())
    }
}

/// Immutable snapshot of a workflow definition at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    id: WorkflowVersionId,
    workflow_id: WorkflowId,
    version: i32,
    definition: WorkflowDefinition,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl WorkflowVersion {
    /// Creates a version snapshot for a workflow.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        version: i32,
        definition: WorkflowDefinition,
        created_by: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkflowVersionId::new(),
            workflow_id,
            version,
            definition,
            created_by,
            created_at,
        }
    }

    /// Returns the version snapshot id.
    #[must_use]
    pub fn id(&self) -> WorkflowVersionId {
        self.id
    }

    /// Returns the owning workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Returns the version number.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the snapshotted definition.
    #[must_use]
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Returns the subject that created this version.
    #[must_use]
    pub fn created_by(&self) -> &str {
        self.created_by.as_str()
    }

    /// Returns the snapshot timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_node(id: &str) -> Node {
        Node {
            id: id.to_owned(),
            kind: NodeKind::TriggerWebhook,
            name: "Webhook".to_owned(),
            position: Position { x: 0.0, y: 0.0 },
            config: Value::Null,
            credential_id: None,
        }
    }

    fn action_node(id: &str) -> Node {
        Node {
            id: id.to_owned(),
            kind: NodeKind::ActionHttp,
            name: "HTTP".to_owned(),
            position: Position { x: 0.0, y: 0.0 },
            config: Value::Null,
            credential_id: None,
        }
    }

    #[test]
    fn definition_requires_a_trigger_node() {
        let result = WorkflowDefinition::new(vec![action_node("a")], vec![]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn definition_rejects_duplicate_node_ids() {
        let result = WorkflowDefinition::new(vec![trigger_node("n1"), action_node("n1")], vec![]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn definition_rejects_edge_to_unknown_node() {
        let nodes = vec![trigger_node("n1"), action_node("n2")];
        let edges = vec![Edge {
            id: "e1".to_owned(),
            source: "n1".to_owned(),
            target: "missing".to_owned(),
            label: None,
        }];
        let result = WorkflowDefinition::new(nodes, edges);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn definition_accepts_a_valid_linear_graph() {
        let nodes = vec![trigger_node("n1"), action_node("n2")];
        let edges = vec![Edge {
            id: "e1".to_owned(),
            source: "n1".to_owned(),
            target: "n2".to_owned(),
            label: None,
        }];
        let result = WorkflowDefinition::new(nodes, edges);
        assert!(result.is_ok());
    }

    #[test]
    fn archived_workflow_rejects_definition_replacement() {
        let definition = WorkflowDefinition::new(vec![trigger_node("n1")], vec![])
            .unwrap_or_else(|_| unreachable!());
        let now = Utc::now();
        let workflow = Workflow::new(WorkflowInput {
            tenant_id: TenantId::new(),
            name: "Test".to_owned(),
            description: None,
            definition: definition.clone(),
            created_by: "tester".to_owned(),
            created_at: now,
        });
        assert!(workflow.is_ok());
        let mut workflow = workflow.unwrap_or_else(|_| unreachable!());
        workflow.archive(now);

        let result = workflow.replace_definition(definition, now);
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn replacing_definition_bumps_version() {
        let definition = WorkflowDefinition::new(vec![trigger_node("n1")], vec![])
            .unwrap_or_else(|_| unreachable!());
        let now = Utc::now();
        let workflow = Workflow::new(WorkflowInput {
            tenant_id: TenantId::new(),
            name: "Test".to_owned(),
            description: None,
            definition: definition.clone(),
            created_by: "tester".to_owned(),
            created_at: now,
        });
        assert!(workflow.is_ok());
        let mut workflow = workflow.unwrap_or_else(|_| unreachable!());
        assert_eq!(workflow.version(), 1);

        let result = workflow.replace_definition(definition, now);
        assert!(result.is_ok());
        assert_eq!(workflow.version(), 2);
    }
}
