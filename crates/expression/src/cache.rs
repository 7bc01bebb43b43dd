use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::ast::Expr;
use crate::error::ExpressionError;
use crate::lexer::tokenize;
use crate::parser::Parser;

/// Default bound on the number of distinct expression texts kept compiled.
pub const DEFAULT_CAPACITY: usize = 1_024;

/// Compiles an expression's text into its AST.
///
/// This is the shared compilation path for both cached and uncached
/// evaluation, so the two always agree on output for the same input.
pub fn compile(text: &str) -> Result<Arc<Expr>, ExpressionError> {
    if text.trim().is_empty() {
        return Err(ExpressionError::EmptyExpression);
    }

    let tokens = tokenize(text)?;
    let expr = Parser::new(&tokens).parse()?;
    Ok(Arc::new(expr))
}

/// Hit/miss counters for an [`ExpressionCache`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Number of lookups served from the cache.
    pub hits: u64,
    /// Number of lookups that required compiling the expression.
    pub misses: u64,
    /// `hits / (hits + misses)`, `0.0` when nothing has been looked up yet.
    pub hit_rate: f64,
}

/// Thread-safe bounded LRU cache from expression text to compiled AST.
///
/// Keyed by expression text only — the compiled program is immutable and
/// reused across different runtime environments. Concurrent readers do not
/// block each other for long; the lock is held only for the lookup/insert,
/// never across evaluation.
pub struct ExpressionCache {
    entries: Mutex<LruCache<String, Arc<Expr>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExpressionCache {
    /// Creates a cache bounded to `capacity` distinct expression texts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity =
            NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1).unwrap_or_else(|| unreachable!()));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a compiled program for `text`, compiling and caching on a miss.
    pub fn get_or_compile(&self, text: &str) -> Result<Arc<Expr>, ExpressionError> {
        if let Some(compiled) = self.entries.lock().get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(compiled));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = compile(text)?;
        self.entries.lock().put(text.to_owned(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Returns current hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
        }
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_of_the_same_text_hit_the_cache() {
        let cache = ExpressionCache::default();
        assert!(cache.get_or_compile("1 + 1").is_ok());
        assert!(cache.get_or_compile("1 + 1").is_ok());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_expression_is_rejected_before_reaching_the_cache() {
        let cache = ExpressionCache::default();
        let result = cache.get_or_compile("   ");
        assert!(matches!(result, Err(ExpressionError::EmptyExpression)));
    }
}
