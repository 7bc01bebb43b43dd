use orbitflow_domain::{Node, NodeKind};

use crate::issue::DryRunIssue;

fn require_string_field(node: &Node, field: &str) -> Option<DryRunIssue> {
    let present = node
        .config
        .get(field)
        .is_some_and(|value| value.as_str().is_some_and(|text| !text.trim().is_empty()));
    if present {
        None
    } else {
        Some(DryRunIssue::on_node(
            node.id.clone(),
            field,
            format!("{:?} node requires a non-empty \"{field}\" config field", node.kind),
        ))
    }
}

fn require_array_field(node: &Node, field: &str) -> Option<DryRunIssue> {
    let present = node.config.get(field).is_some_and(|value| value.is_array());
    if present {
        None
    } else {
        Some(DryRunIssue::on_node(
            node.id.clone(),
            field,
            format!("{:?} node requires an array \"{field}\" config field", node.kind),
        ))
    }
}

fn require_number_field(node: &Node, field: &str) -> Option<DryRunIssue> {
    let present = node.config.get(field).is_some_and(|value| value.is_number());
    if present {
        None
    } else {
        Some(DryRunIssue::on_node(
            node.id.clone(),
            field,
            format!("{:?} node requires a numeric \"{field}\" config field", node.kind),
        ))
    }
}

fn require_object_field(node: &Node, field: &str) -> Option<DryRunIssue> {
    let present = node.config.get(field).is_some_and(|value| value.is_object());
    if present {
        None
    } else {
        Some(DryRunIssue::on_node(
            node.id.clone(),
            field,
            format!("{:?} node requires an object \"{field}\" config field", node.kind),
        ))
    }
}

/// Applies a type-specific config schema check to one non-trigger node.
///
/// Trigger nodes are not executed by the core runtime and carry no schema
/// beyond what their external collaborator enforces, so they are skipped.
pub fn validate_node_config(node: &Node) -> Vec<DryRunIssue> {
    let mut issues = Vec::new();

    match node.kind {
        NodeKind::TriggerWebhook | NodeKind::TriggerSchedule => {}
        NodeKind::ActionHttp => {
            issues.extend(require_string_field(node, "method"));
            issues.extend(require_string_field(node, "url"));
        }
        NodeKind::ActionTransform => {
            issues.extend(require_object_field(node, "mapping"));
        }
        NodeKind::ActionFormula => {
            issues.extend(require_string_field(node, "expression"));
        }
        NodeKind::ControlIf => {
            issues.extend(require_string_field(node, "condition"));
        }
        NodeKind::ControlLoop => {
            issues.extend(require_string_field(node, "source"));
            issues.extend(require_string_field(node, "item_variable"));
        }
        NodeKind::ControlParallel | NodeKind::ControlFork => {
            issues.extend(require_array_field(node, "branches"));
        }
        NodeKind::ControlJoin => {
            issues.extend(require_string_field(node, "wait_mode"));
        }
        NodeKind::ControlDelay => {
            issues.extend(require_string_field(node, "duration"));
        }
        NodeKind::ControlSubWorkflow => {
            issues.extend(require_string_field(node, "workflow_id"));
        }
        NodeKind::ControlTry => {
            issues.extend(require_array_field(node, "try_nodes"));
        }
        NodeKind::ControlCatch => {
            issues.extend(require_string_field(node, "error_binding"));
        }
        NodeKind::ControlFinally => {}
        NodeKind::ControlRetry => {
            issues.extend(require_string_field(node, "strategy"));
            issues.extend(require_number_field(node, "max_attempts"));
        }
        NodeKind::ControlCircuitBreaker => {
            issues.extend(require_string_field(node, "name"));
            issues.extend(require_number_field(node, "max_failures"));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbitflow_domain::Position;
    use serde_json::json;

    fn node_with_config(kind: NodeKind, config: serde_json::Value) -> Node {
        Node {
            id: "n1".to_owned(),
            kind,
            name: "node".to_owned(),
            position: Position { x: 0.0, y: 0.0 },
            config,
            credential_id: None,
        }
    }

    #[test]
    fn http_node_requires_method_and_url() {
        let node = node_with_config(NodeKind::ActionHttp, json!({}));
        let issues = validate_node_config(&node);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn http_node_with_complete_config_passes() {
        let node = node_with_config(
            NodeKind::ActionHttp,
            json!({ "method": "GET", "url": "https://example.com" }),
        );
        assert!(validate_node_config(&node).is_empty());
    }

    #[test]
    fn trigger_nodes_are_not_schema_checked() {
        let node = node_with_config(NodeKind::TriggerWebhook, json!({}));
        assert!(validate_node_config(&node).is_empty());
    }
}
