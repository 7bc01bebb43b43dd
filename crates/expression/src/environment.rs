use std::collections::HashMap;

use serde_json::Value;

/// One segment of a dotted/indexed path such as `steps.http.body[0].id`.
#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
                let mut digits = String::new();
                for digit in chars.by_ref() {
                    if digit == ']' {
                        break;
                    }
                    digits.push(digit);
                }
                if let Ok(index) = digits.parse::<usize>() {
                    segments.push(PathSegment::Index(index));
                }
            }
            other => current.push(other),
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Field(current));
    }

    segments
}

/// Name→value bindings an expression or template is evaluated against.
///
/// Populated by the executor with `trigger`, `steps.<node_id>`, and any loop
/// item/index variables bound by an enclosing `control:loop`. Owned by the
/// executor task for one execution; never shared mutably across branches.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, Value>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a root variable, replacing any existing binding of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Returns a root variable's value.
    #[must_use]
    pub fn get_root(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Removes a root variable, returning its prior value if bound.
    ///
    /// Used to unwind loop-scoped bindings (`item_variable`/`index_variable`)
    /// once an iteration's sub-graph finishes.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Resolves a dotted/indexed path against the environment, e.g.
    /// `steps.http.body[0].id` or a bare `trigger`.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let segments = parse_path(path);
        let mut iter = segments.into_iter();
        let PathSegment::Field(root_name) = iter.next()? else {
            return None;
        };

        let mut current = self.vars.get(&root_name)?.clone();
        for segment in iter {
            current = match segment {
                PathSegment::Field(field) => current.get(&field)?.clone(),
                PathSegment::Index(index) => current.get(index)?.clone(),
            };
        }

        Some(current)
    }
}

/// Clears an environment's bindings so it can be returned to a pool instead
/// of reallocated per evaluation.
pub fn recycle(environment: &mut Environment) {
    environment.vars.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_member_and_index_path() {
        let mut env = Environment::new();
        env.set(
            "steps",
            serde_json::json!({ "http": { "body": [{ "id": "abc" }] } }),
        );

        let resolved = env.resolve_path("steps.http.body[0].id");
        assert_eq!(resolved, Some(Value::String("abc".to_owned())));
    }

    #[test]
    fn unresolved_path_returns_none() {
        let env = Environment::new();
        assert_eq!(env.resolve_path("steps.nonexistent.data"), None);
    }

    #[test]
    fn recycle_clears_bindings() {
        let mut env = Environment::new();
        env.set("trigger", Value::Bool(true));
        recycle(&mut env);
        assert_eq!(env.get_root("trigger"), None);
    }
}
