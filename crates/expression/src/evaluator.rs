use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::environment::Environment;
use crate::error::ExpressionError;
use crate::functions;

fn eval_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::EvalError(message.into())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn as_number(value: &Value) -> Result<f64, ExpressionError> {
    value
        .as_f64()
        .ok_or_else(|| eval_error(format!("expected a number, found {value}")))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    left == right
}

/// Evaluates a parsed expression against an environment.
pub fn eval(expr: &Expr, env: &Environment) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Number(value) => Ok(serde_json::json!(value)),
        Expr::Str(value) => Ok(Value::String(value.clone())),
        Expr::Bool(value) => Ok(Value::Bool(*value)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => env
            .get_root(name)
            .cloned()
            .ok_or_else(|| eval_error(format!("undefined variable: {name}"))),
        Expr::Member(target, field) => {
            let target = eval(target, env)?;
            target
                .get(field)
                .cloned()
                .ok_or_else(|| eval_error(format!("no such field: {field}")))
        }
        Expr::Index(target, index) => {
            let target = eval(target, env)?;
            let index = eval(index, env)?;
            match (&target, &index) {
                (Value::Array(_), _) => {
                    let position = as_number(&index)? as usize;
                    target
                        .get(position)
                        .cloned()
                        .ok_or_else(|| eval_error(format!("index out of bounds: {position}")))
                }
                (Value::Object(_), Value::String(key)) => target
                    .get(key)
                    .cloned()
                    .ok_or_else(|| eval_error(format!("no such field: {key}"))),
                _ => Err(eval_error("indexed access requires an array or object")),
            }
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(name, &values)
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, env)?;
            match op {
                UnaryOp::Neg => Ok(serde_json::json!(-as_number(&value)?)),
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            }
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, env),
        Expr::Ternary(condition, when_true, when_false) => {
            if truthy(&eval(condition, env)?) {
                eval(when_true, env)
            } else {
                eval(when_false, env)
            }
        }
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    env: &Environment,
) -> Result<Value, ExpressionError> {
    if op == BinaryOp::And {
        let left = eval(left, env)?;
        return if !truthy(&left) {
            Ok(Value::Bool(false))
        } else {
            Ok(Value::Bool(truthy(&eval(right, env)?)))
        };
    }

    if op == BinaryOp::Or {
        let left = eval(left, env)?;
        return if truthy(&left) {
            Ok(Value::Bool(true))
        } else {
            Ok(Value::Bool(truthy(&eval(right, env)?)))
        };
    }

    let left = eval(left, env)?;
    let right = eval(right, env)?;

    match op {
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Ok(Value::String(format!(
                    "{}{}",
                    functions::coerce_to_string(&left),
                    functions::coerce_to_string(&right)
                )))
            } else {
                Ok(serde_json::json!(as_number(&left)? + as_number(&right)?))
            }
        }
        BinaryOp::Sub => Ok(serde_json::json!(as_number(&left)? - as_number(&right)?)),
        BinaryOp::Mul => Ok(serde_json::json!(as_number(&left)? * as_number(&right)?)),
        BinaryOp::Div => {
            let divisor = as_number(&right)?;
            if divisor == 0.0 {
                return Err(eval_error("division by zero"));
            }
            Ok(serde_json::json!(as_number(&left)? / divisor))
        }
        BinaryOp::Rem => {
            let divisor = as_number(&right)?;
            if divisor == 0.0 {
                return Err(eval_error("division by zero"));
            }
            Ok(serde_json::json!(as_number(&left)? % divisor))
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt => Ok(Value::Bool(as_number(&left)? < as_number(&right)?)),
        BinaryOp::LtEq => Ok(Value::Bool(as_number(&left)? <= as_number(&right)?)),
        BinaryOp::Gt => Ok(Value::Bool(as_number(&left)? > as_number(&right)?)),
        BinaryOp::GtEq => Ok(Value::Bool(as_number(&left)? >= as_number(&right)?)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled by short-circuit branch above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn eval_str(source: &str, env: &Environment) -> Result<Value, ExpressionError> {
        let tokens = tokenize(source)?;
        let expr = Parser::new(&tokens).parse()?;
        eval(&expr, env)
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let env = Environment::new();
        let result = eval_str("2 + 3 * 4", &env);
        assert_eq!(result, Ok(serde_json::json!(14.0)));
    }

    #[test]
    fn evaluates_ternary_conditional() {
        let env = Environment::new();
        let result = eval_str("1 < 2 ? \"yes\" : \"no\"", &env);
        assert_eq!(result, Ok(Value::String("yes".to_owned())));
    }

    #[test]
    fn resolves_member_and_index_access() {
        let mut env = Environment::new();
        env.set("trigger", serde_json::json!({ "items": [10, 20, 30] }));
        let result = eval_str("trigger.items[1]", &env);
        assert_eq!(result, Ok(serde_json::json!(20)));
    }

    #[test]
    fn undefined_variable_errors() {
        let env = Environment::new();
        let result = eval_str("missing + 1", &env);
        assert!(matches!(result, Err(ExpressionError::EvalError(_))));
    }

    #[test]
    fn string_concatenation_with_plus() {
        let env = Environment::new();
        let result = eval_str("\"id-\" + 5", &env);
        assert_eq!(result, Ok(Value::String("id-5".to_owned())));
    }

    #[test]
    fn and_short_circuits_before_evaluating_right_side() {
        let env = Environment::new();
        let result = eval_str("false && (1 / 0 > 0)", &env);
        assert_eq!(result, Ok(Value::Bool(false)));
    }
}
