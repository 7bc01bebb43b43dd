use std::fmt;

/// Failure modes of expression compilation and evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression text was empty or whitespace-only.
    EmptyExpression,
    /// Tokenizing or parsing failed.
    CompileError(String),
    /// Parsing succeeded but evaluation failed (type error, unknown
    /// function, undefined variable, arity mismatch, ...).
    EvalError(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyExpression => write!(formatter, "expression must not be empty"),
            Self::CompileError(message) => write!(formatter, "compile error: {message}"),
            Self::EvalError(message) => write!(formatter, "eval error: {message}"),
        }
    }
}

impl std::error::Error for ExpressionError {}
