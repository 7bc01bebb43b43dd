//! Expression language: tokenizer, parser, evaluator, and compile cache.

#![forbid(unsafe_code)]

mod ast;
mod cache;
mod environment;
mod error;
mod evaluator;
mod functions;
mod lexer;
mod parser;
mod template;

pub use ast::Expr;
pub use cache::{CacheStats, DEFAULT_CAPACITY, ExpressionCache, compile};
pub use environment::{Environment, recycle};
pub use error::ExpressionError;
pub use template::reference_paths;
pub use template::render as render_template;

use serde_json::Value;

/// Evaluates an expression against an environment using a shared compile
/// cache, avoiding recompilation of repeated expression text.
pub struct Evaluator {
    cache: ExpressionCache,
}

impl Evaluator {
    /// Creates an evaluator with a cache bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: ExpressionCache::new(capacity),
        }
    }

    /// Compiles (or reuses a cached compilation of) `text`, then evaluates
    /// it against `environment`.
    pub fn evaluate(&self, text: &str, environment: &Environment) -> Result<Value, ExpressionError> {
        let compiled = self.cache.get_or_compile(text)?;
        evaluator::eval(&compiled, environment)
    }

    /// Returns the evaluator's compile-cache hit/miss statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_and_uncached_evaluation_agree() {
        let evaluator = Evaluator::default();
        let mut env = Environment::new();
        env.set("trigger", serde_json::json!({ "count": 3 }));

        let first = evaluator.evaluate("trigger.count * 2", &env);
        let second = evaluator.evaluate("trigger.count * 2", &env);
        assert_eq!(first, second);
        assert_eq!(first, Ok(serde_json::json!(6.0)));
        assert_eq!(evaluator.cache_stats().hits, 1);
    }

    #[test]
    fn empty_expression_is_rejected() {
        let evaluator = Evaluator::default();
        let env = Environment::new();
        let result = evaluator.evaluate("", &env);
        assert!(matches!(result, Err(ExpressionError::EmptyExpression)));
    }
}
