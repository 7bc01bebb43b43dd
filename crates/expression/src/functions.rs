use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::ExpressionError;

fn eval_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::EvalError(message.into())
}

fn as_number(value: &Value) -> Result<f64, ExpressionError> {
    value
        .as_f64()
        .ok_or_else(|| eval_error(format!("expected a number, found {value}")))
}

fn as_str(value: &Value) -> Result<&str, ExpressionError> {
    value
        .as_str()
        .ok_or_else(|| eval_error(format!("expected a string, found {value}")))
}

/// Coerces a value to its display string per the `concat` coercion rules:
/// numbers render as plain decimal text, booleans as `true`/`false`, and
/// `null` as the empty string.
#[must_use]
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => (if *flag { "true" } else { "false" }).to_owned(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn require_arity(name: &str, args: &[Value], expected: usize) -> Result<(), ExpressionError> {
    if args.len() != expected {
        return Err(eval_error(format!(
            "{name} expects {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

/// Dispatches a built-in function call by name.
pub fn call(name: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    match name {
        "upper" => {
            require_arity(name, args, 1)?;
            Ok(Value::String(as_str(&args[0])?.to_uppercase()))
        }
        "lower" => {
            require_arity(name, args, 1)?;
            Ok(Value::String(as_str(&args[0])?.to_lowercase()))
        }
        "trim" => {
            require_arity(name, args, 1)?;
            Ok(Value::String(as_str(&args[0])?.trim().to_owned()))
        }
        "concat" => Ok(Value::String(
            args.iter().map(coerce_to_string).collect::<String>(),
        )),
        "substr" => substr(args),
        "now" => {
            require_arity(name, args, 0)?;
            Ok(Value::String(Utc::now().to_rfc3339()))
        }
        "dateFormat" => date_format(args),
        "dateParse" => date_parse(args),
        "addDays" => add_days(args),
        "round" => {
            require_arity(name, args, 1)?;
            Ok(serde_json::json!(as_number(&args[0])?.round()))
        }
        "ceil" => {
            require_arity(name, args, 1)?;
            Ok(serde_json::json!(as_number(&args[0])?.ceil()))
        }
        "floor" => {
            require_arity(name, args, 1)?;
            Ok(serde_json::json!(as_number(&args[0])?.floor()))
        }
        "abs" => {
            require_arity(name, args, 1)?;
            Ok(serde_json::json!(as_number(&args[0])?.abs()))
        }
        "min" => variadic_numeric_extreme(name, args, f64::min),
        "max" => variadic_numeric_extreme(name, args, f64::max),
        "len" => len(args),
        other => Err(eval_error(format!("unknown function: {other}"))),
    }
}

fn substr(args: &[Value]) -> Result<Value, ExpressionError> {
    require_arity("substr", args, 3)?;
    let text = as_str(&args[0])?;
    let start = as_number(&args[1])?;
    let length = as_number(&args[2])?;

    if start < 0.0 || length < 0.0 {
        return Err(eval_error("substr does not accept negative arguments"));
    }

    let chars: Vec<char> = text.chars().collect();
    let start = (start as usize).min(chars.len());
    let end = start.saturating_add(length as usize).min(chars.len());
    Ok(Value::String(chars[start..end].iter().collect()))
}

fn date_format(args: &[Value]) -> Result<Value, ExpressionError> {
    require_arity("dateFormat", args, 2)?;
    let instant = as_str(&args[0])?;
    let layout = as_str(&args[1])?;
    let parsed: DateTime<Utc> = instant
        .parse()
        .map_err(|_| eval_error(format!("dateFormat: invalid instant: {instant}")))?;
    Ok(Value::String(parsed.format(layout).to_string()))
}

fn date_parse(args: &[Value]) -> Result<Value, ExpressionError> {
    require_arity("dateParse", args, 2)?;
    let text = as_str(&args[0])?;
    let layout = as_str(&args[1])?;
    let parsed = DateTime::parse_from_str(text, layout)
        .map_err(|error| eval_error(format!("dateParse: {error}")))?;
    Ok(Value::String(parsed.with_timezone(&Utc).to_rfc3339()))
}

fn add_days(args: &[Value]) -> Result<Value, ExpressionError> {
    require_arity("addDays", args, 2)?;
    let instant = as_str(&args[0])?;
    let days = as_number(&args[1])?;
    let parsed: DateTime<Utc> = instant
        .parse()
        .map_err(|_| eval_error(format!("addDays: invalid instant: {instant}")))?;
    let shifted = parsed + Duration::days(days as i64);
    Ok(Value::String(shifted.to_rfc3339()))
}

fn variadic_numeric_extreme(
    name: &str,
    args: &[Value],
    pick: fn(f64, f64) -> f64,
) -> Result<Value, ExpressionError> {
    if args.is_empty() {
        return Err(eval_error(format!("{name} requires at least one argument")));
    }

    let mut numbers = args.iter().map(as_number);
    let first = numbers.next().unwrap_or_else(|| unreachable!())?;
    let mut result = first;
    for number in numbers {
        result = pick(result, number?);
    }
    Ok(serde_json::json!(result))
}

fn len(args: &[Value]) -> Result<Value, ExpressionError> {
    require_arity("len", args, 1)?;
    let length = match &args[0] {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        other => {
            return Err(eval_error(format!(
                "len expects an array or string, found {other}"
            )));
        }
    };
    Ok(serde_json::json!(length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_clamps_length_to_string_bounds() {
        let result = call(
            "substr",
            &[Value::String("hello".to_owned()), serde_json::json!(2), serde_json::json!(10)],
        );
        assert_eq!(result, Ok(Value::String("llo".to_owned())));
    }

    #[test]
    fn substr_rejects_negative_start() {
        let result = call(
            "substr",
            &[Value::String("hello".to_owned()), serde_json::json!(-1), serde_json::json!(2)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn concat_coerces_mixed_argument_types() {
        let result = call(
            "concat",
            &[
                Value::String("id=".to_owned()),
                serde_json::json!(5),
                Value::Bool(true),
                Value::Null,
            ],
        );
        assert_eq!(result, Ok(Value::String("id=5true".to_owned())));
    }

    #[test]
    fn min_requires_at_least_one_argument() {
        let result = call("min", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn len_counts_array_elements() {
        let result = call("len", &[serde_json::json!([1, 2, 3])]);
        assert_eq!(result, Ok(serde_json::json!(3)));
    }
}
