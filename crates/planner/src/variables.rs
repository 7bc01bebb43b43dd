use serde_json::Value;

/// Recursively collects every `${path}` reference found in string leaves of
/// a node's config value.
pub fn collect_references(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    collect_into(value, &mut refs);
    refs
}

fn collect_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(orbitflow_expression::reference_paths(text)),
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, out)),
        Value::Object(fields) => fields.values().for_each(|field| collect_into(field, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Returns whether `path` resolves against the set of variable paths known
/// to be available at this point in the topological walk.
///
/// A path is available when it, or a dotted prefix of it, was previously
/// registered — e.g. `steps.http.body.id` is available once `steps.http` (or
/// bare `steps`) has been registered.
#[must_use]
pub fn is_available(path: &str, available: &std::collections::HashSet<String>) -> bool {
    let segments: Vec<&str> = path.split(['.', '[']).collect();
    let mut prefix = String::new();
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            prefix.push('.');
        }
        prefix.push_str(segment.trim_end_matches(']'));
        if available.contains(&prefix) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn collects_references_from_nested_config() {
        let config = serde_json::json!({
            "mapping": { "id": "${trigger.payload.id}", "label": "static" },
            "tags": ["${steps.http.status}"],
        });
        let mut refs = collect_references(&config);
        refs.sort();
        assert_eq!(refs, vec!["steps.http.status".to_owned(), "trigger.payload.id".to_owned()]);
    }

    #[test]
    fn bare_root_covers_nested_paths() {
        let mut available = HashSet::new();
        available.insert("trigger".to_owned());
        assert!(is_available("trigger.payload.id", &available));
    }

    #[test]
    fn unregistered_path_is_unavailable() {
        let available = HashSet::new();
        assert!(!is_available("steps.nonexistent.data", &available));
    }
}
