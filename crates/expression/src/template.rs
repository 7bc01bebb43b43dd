use serde_json::Value;

use crate::environment::Environment;
use crate::error::ExpressionError;
use crate::functions::coerce_to_string;

struct Reference {
    start: usize,
    end: usize,
    path: String,
}

fn find_references(text: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    let bytes = text.as_bytes();
    let mut index = 0usize;

    while index < bytes.len() {
        if bytes[index] == b'$' && bytes.get(index + 1) == Some(&b'{') {
            if let Some(relative_close) = text[index + 2..].find('}') {
                let close = index + 2 + relative_close;
                references.push(Reference {
                    start: index,
                    end: close + 1,
                    path: text[index + 2..close].trim().to_owned(),
                });
                index = close + 1;
                continue;
            }
        }
        index += 1;
    }

    references
}

/// Returns the `${path}` reference paths found in a configuration string,
/// without resolving them against an environment.
///
/// Used by the planner's dry-run variable-reference check (rule 6), which
/// needs to know *what* a config field references before any environment
/// exists to resolve it against.
#[must_use]
pub fn reference_paths(text: &str) -> Vec<String> {
    find_references(text)
        .into_iter()
        .map(|reference| reference.path)
        .collect()
}

/// Renders `${path}` references inside a configuration string against an
/// environment.
///
/// When the entire (trimmed) text is a single reference, the resolved value
/// is returned as-is — this lets `control:loop`'s `source` field or an HTTP
/// `body_template` resolve to an array or object rather than its stringified
/// form. Mixed text interpolates each reference's coerced string form.
pub fn render(text: &str, env: &Environment) -> Result<Value, ExpressionError> {
    let references = find_references(text);
    if references.is_empty() {
        return Ok(Value::String(text.to_owned()));
    }

    if references.len() == 1 && references[0].start == 0 && references[0].end == text.len() {
        let reference = &references[0];
        return env.resolve_path(&reference.path).ok_or_else(|| {
            ExpressionError::EvalError(format!("undefined variable: {}", reference.path))
        });
    }

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for reference in &references {
        output.push_str(&text[cursor..reference.start]);
        let value = env.resolve_path(&reference.path).ok_or_else(|| {
            ExpressionError::EvalError(format!("undefined variable: {}", reference.path))
        })?;
        output.push_str(&coerce_to_string(&value));
        cursor = reference.end;
    }
    output.push_str(&text[cursor..]);

    Ok(Value::String(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_text_reference_preserves_value_shape() {
        let mut env = Environment::new();
        env.set("trigger", serde_json::json!({ "items": [1, 2, 3] }));

        let result = render("${trigger.items}", &env);
        assert_eq!(result, Ok(serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn mixed_text_interpolates_as_string() {
        let mut env = Environment::new();
        env.set("trigger", serde_json::json!({ "id": 42 }));

        let result = render("id: ${trigger.id}!", &env);
        assert_eq!(result, Ok(Value::String("id: 42!".to_owned())));
    }

    #[test]
    fn unresolved_reference_errors() {
        let env = Environment::new();
        let result = render("${steps.nonexistent.data}", &env);
        assert!(matches!(result, Err(ExpressionError::EvalError(_))));
    }

    #[test]
    fn text_without_references_passes_through() {
        let env = Environment::new();
        let result = render("plain text", &env);
        assert_eq!(result, Ok(Value::String("plain text".to_owned())));
    }
}
