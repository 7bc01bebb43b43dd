/// Default page size applied when a caller omits a list limit.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Maximum page size a caller may request.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Maximum `execution_depth` a sub-workflow chain may reach before the
/// executor refuses to start a further nested execution.
pub const MAX_EXECUTION_DEPTH: i32 = 25;

/// Clamps a caller-supplied list limit into `[1, MAX_LIST_LIMIT]`, falling
/// back to `DEFAULT_LIST_LIMIT` for non-positive values.
#[must_use]
pub fn clamp_list_limit(requested: i64) -> i64 {
    if requested <= 0 {
        DEFAULT_LIST_LIMIT
    } else {
        requested.min(MAX_LIST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, clamp_list_limit};

    #[test]
    fn non_positive_limit_clamps_to_default() {
        assert_eq!(clamp_list_limit(0), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_list_limit(-5), DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn oversized_limit_clamps_to_maximum() {
        assert_eq!(clamp_list_limit(1_000), MAX_LIST_LIMIT);
    }

    #[test]
    fn in_range_limit_is_unchanged() {
        assert_eq!(clamp_list_limit(42), 42);
    }
}
