use std::collections::{HashMap, VecDeque};

use orbitflow_domain::{Edge, Node};

/// Computes a topological order over a node/edge graph using Kahn's
/// algorithm: initialize in-degree, enqueue zero-in-degree nodes, emit then
/// decrement successors.
///
/// Returns `None` when the graph contains a cycle — the emitted sequence is
/// then shorter than `nodes.len()`.
#[must_use]
pub fn topological_order(nodes: &[Node], edges: &[Edge]) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        nodes.iter().map(|node| (node.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        if !in_degree.contains_key(edge.source.as_str()) || !in_degree.contains_key(edge.target.as_str()) {
            continue;
        }
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
        successors
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    // Deterministic emission order for nodes with equal in-degree.
    let mut initial: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    initial.sort_unstable();
    let mut queue: VecDeque<&str> = initial.into();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_owned());

        let mut newly_ready = Vec::new();
        if let Some(targets) = successors.get(current) {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0 {
                        newly_ready.push(*target);
                    }
                }
            }
        }
        newly_ready.sort_unstable();
        queue.extend(newly_ready);
    }

    if order.len() == nodes.len() {
        Some(order)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbitflow_domain::{NodeKind, Position};
    use serde_json::Value;

    fn node(id: &str, kind: NodeKind) -> Node {
        Node {
            id: id.to_owned(),
            kind,
            name: id.to_owned(),
            position: Position { x: 0.0, y: 0.0 },
            config: Value::Null,
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
    fn orders_a_linear_chain() {
        let nodes = vec![
            node("a", NodeKind::TriggerWebhook),
            node("b", NodeKind::ActionHttp),
            node("c", NodeKind::ActionTransform),
        ];
        let edges = vec![edge("e1", "a", "b"), edge("e2", "b", "c")];

        let order = topological_order(&nodes, &edges);
        assert_eq!(order, Some(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]));
    }

    #[test]
    fn detects_a_three_node_cycle() {
        let nodes = vec![
            node("a", NodeKind::ActionTransform),
            node("b", NodeKind::ActionTransform),
            node("c", NodeKind::ActionTransform),
        ];
        let edges = vec![
            edge("e1", "a", "b"),
            edge("e2", "b", "c"),
            edge("e3", "c", "a"),
        ];

        assert_eq!(topological_order(&nodes, &edges), None);
    }
}
