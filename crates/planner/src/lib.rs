//! Graph planning: topological ordering and dry-run validation.

#![forbid(unsafe_code)]

mod issue;
mod schema;
mod topo;
mod variables;

pub use issue::DryRunIssue;
pub use topo::topological_order;

use std::collections::HashSet;

use orbitflow_domain::{Edge, Node};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a workflow graph dry run (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunReport {
    /// Whether the graph is free of errors.
    pub valid: bool,
    /// Topological node order, empty when the graph contains a cycle.
    pub execution_order: Vec<String>,
    /// Distinct variable paths successfully referenced anywhere in the graph.
    pub variable_mapping: Vec<String>,
    /// Non-fatal issues, e.g. unverified `credential_id` references.
    pub warnings: Vec<DryRunIssue>,
    /// Fatal issues; a non-empty list implies `valid = false`.
    pub errors: Vec<DryRunIssue>,
}

/// Validates a workflow graph and computes its execution plan.
///
/// Accepts raw nodes/edges rather than a constructed `WorkflowDefinition` so
/// it can also preview a draft graph before it satisfies the domain
/// constructor's invariants.
#[must_use]
pub fn dry_run(nodes: &[Node], edges: &[Edge], test_data: &Map<String, Value>) -> DryRunReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if nodes.is_empty() {
        errors.push(DryRunIssue::on_graph("nodes", "workflow must contain at least one node"));
    }

    if !nodes.iter().any(|node| node.kind.is_trigger()) {
        errors.push(DryRunIssue::on_graph(
            "nodes",
            "workflow must contain at least one trigger node",
        ));
    }

    let node_ids: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
    for edge in edges {
        if !node_ids.contains(edge.source.as_str()) || !node_ids.contains(edge.target.as_str()) {
            errors.push(DryRunIssue::on_graph(
                "edges",
                format!("edge {} references an unknown node", edge.id),
            ));
        }
    }

    let execution_order = topo::topological_order(nodes, edges).unwrap_or_default();
    if execution_order.len() != nodes.len() {
        errors.push(DryRunIssue::on_graph("edges", "workflow contains cycles"));
    }

    for node in nodes {
        errors.extend(schema::validate_node_config(node));

        if node.credential_id.is_some() {
            warnings.push(DryRunIssue::on_node(
                node.id.clone(),
                "credential_id",
                "credential existence is not checked at dry-run time",
            ));
        }
    }

    let mut available: HashSet<String> = HashSet::from(["trigger".to_owned()]);
    for key in test_data.keys() {
        available.insert(format!("trigger.{key}"));
    }

    let mut variable_mapping: Vec<String> = Vec::new();
    for node_id in &execution_order {
        let Some(node) = nodes.iter().find(|node| &node.id == node_id) else {
            continue;
        };

        for reference in variables::collect_references(&node.config) {
            if variables::is_available(&reference, &available) {
                variable_mapping.push(reference);
            } else {
                errors.push(DryRunIssue::on_node(
                    node.id.clone(),
                    "mapping",
                    format!("undefined variable reference: {reference}"),
                ));
            }
        }

        available.insert(format!("steps.{node_id}"));

        if let Some(item_variable) = node.config.get("item_variable").and_then(Value::as_str) {
            available.insert(item_variable.to_owned());
        }
        if let Some(index_variable) = node.config.get("index_variable").and_then(Value::as_str) {
            available.insert(index_variable.to_owned());
        }
    }

    variable_mapping.sort();
    variable_mapping.dedup();

    DryRunReport {
        valid: errors.is_empty(),
        execution_order,
        variable_mapping,
        warnings,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbitflow_domain::{NodeKind, Position};

    fn node(id: &str, kind: NodeKind, config: Value) -> Node {
        Node {
            id: id.to_owned(),
            kind,
            name: id.to_owned(),
            position: Position { x: 0.0, y: 0.0 },
            config,
            credential_id: None,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.to_owned(),
            source: source.to_owned(),
            target: target.to_owned(),
            label: None,
        }
    }

    #[test]
    fn linear_workflow_is_valid_and_resolves_variables() {
        let nodes = vec![
            node("webhook", NodeKind::TriggerWebhook, Value::Null),
            node(
                "http",
                NodeKind::ActionHttp,
                serde_json::json!({ "method": "GET", "url": "${trigger.payload.id}" }),
            ),
            node(
                "transform",
                NodeKind::ActionTransform,
                serde_json::json!({ "mapping": { "status": "${steps.http.status}" } }),
            ),
        ];
        let edges = vec![edge("e1", "webhook", "http"), edge("e2", "http", "transform")];
        let mut test_data = Map::new();
        test_data.insert("payload".to_owned(), serde_json::json!({ "id": "123" }));

        let report = dry_run(&nodes, &edges, &test_data);

        assert!(report.valid);
        assert_eq!(
            report.execution_order,
            vec!["webhook".to_owned(), "http".to_owned(), "transform".to_owned()]
        );
        assert!(report.variable_mapping.contains(&"trigger.payload.id".to_owned()));
        assert!(report.variable_mapping.contains(&"steps.http.status".to_owned()));
    }

    #[test]
    fn three_node_cycle_is_reported() {
        let nodes = vec![
            node("a", NodeKind::ActionTransform, serde_json::json!({ "mapping": {} })),
            node("b", NodeKind::ActionTransform, serde_json::json!({ "mapping": {} })),
            node("c", NodeKind::ActionTransform, serde_json::json!({ "mapping": {} })),
        ];
        let edges = vec![edge("e1", "a", "b"), edge("e2", "b", "c"), edge("e3", "c", "a")];

        let report = dry_run(&nodes, &edges, &Map::new());

        assert!(!report.valid);
        assert!(
            report
                .errors
                .iter()
                .any(|issue| issue.field == "edges" && issue.message.contains("cycle"))
        );
    }

    #[test]
    fn undefined_variable_reference_is_reported() {
        let nodes = vec![
            node("webhook", NodeKind::TriggerWebhook, Value::Null),
            node(
                "transform",
                NodeKind::ActionTransform,
                serde_json::json!({ "mapping": { "x": "${steps.nonexistent.data}" } }),
            ),
        ];
        let edges = vec![edge("e1", "webhook", "transform")];

        let report = dry_run(&nodes, &edges, &Map::new());

        assert!(!report.valid);
        assert!(
            report
                .errors
                .iter()
                .any(|issue| issue.field == "mapping" && issue.message.contains("nonexistent"))
        );
    }
}
