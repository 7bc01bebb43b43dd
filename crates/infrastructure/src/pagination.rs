use chrono::{DateTime, Utc};
use orbitflow_application::Page;
use orbitflow_core::{AppResult, PaginationCursor};
use orbitflow_domain::{Execution, ExecutionFilter};

/// Applies every [`ExecutionFilter`] predicate not already pushed into SQL.
///
/// Both stores scope tenant and order by SQL; the free-text and derived
/// predicates (error substring, id prefix, duration bounds) are evaluated
/// here against the fully materialized row, same as the in-memory store.
pub(crate) fn matches(filter: &ExecutionFilter, execution: &Execution) -> bool {
    if let Some(workflow_id) = filter.workflow_id
        && execution.workflow_id() != workflow_id
    {
        return false;
    }
    if let Some(status) = filter.status
        && execution.status() != status
    {
        return false;
    }
    if let Some(trigger_type) = &filter.trigger_type
        && execution.trigger_type() != trigger_type
    {
        return false;
    }
    if let Some(start_date) = filter.start_date
        && execution.created_at() < start_date
    {
        return false;
    }
    if let Some(end_date) = filter.end_date
        && execution.created_at() > end_date
    {
        return false;
    }
    if let Some(needle) = &filter.error_search {
        let Some(message) = execution.error_message() else { return false };
        if !message.contains(needle.as_str()) {
            return false;
        }
    }
    if let Some(prefix) = &filter.execution_id_prefix
        && !execution.id().to_string().starts_with(prefix.as_str())
    {
        return false;
    }
    let duration_ms = match (execution.started_at(), execution.completed_at()) {
        (Some(started), Some(completed)) => Some((completed - started).num_milliseconds()),
        _ => None,
    };
    if let Some(min_duration_ms) = filter.min_duration_ms
        && duration_ms.is_none_or(|duration| duration < min_duration_ms)
    {
        return false;
    }
    if let Some(max_duration_ms) = filter.max_duration_ms
        && duration_ms.is_none_or(|duration| duration > max_duration_ms)
    {
        return false;
    }
    true
}

/// Sorts `(created_at, id)`-keyed rows newest-first and slices out one page.
pub(crate) fn paginate<T: Clone>(
    mut rows: Vec<(DateTime<Utc>, uuid::Uuid, T)>,
    cursor: Option<PaginationCursor>,
    limit: i64,
) -> AppResult<Page<T>> {
    rows.sort_by(|left, right| right.0.cmp(&left.0).then_with(|| right.1.cmp(&left.1)));
    let total_count = rows.len() as i64;

    let start = match cursor {
        Some(cursor) => rows
            .iter()
            .position(|(created_at, id, _)| (*created_at, *id) < (cursor.created_at, cursor.id))
            .unwrap_or(rows.len()),
        None => 0,
    };

    let limit = limit.max(1) as usize;
    let page: Vec<T> = rows[start..].iter().take(limit).map(|(_, _, item)| item.clone()).collect();
    let has_more = start + page.len() < rows.len();
    let next_cursor = if has_more {
        match rows.get(start + page.len() - 1) {
            Some((created_at, id, _)) => Some(PaginationCursor::new(*created_at, *id).encode()?),
            None => None,
        }
    } else {
        None
    };

    Ok(Page { items: page, next_cursor, has_more, total_count })
}

fn percentile(sorted: &[i64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (fraction * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)] as f64
}

/// Computes `(avg, p50, p90, p99)` over a sorted-in-place duration sample.
pub(crate) fn duration_percentiles(durations: &mut [i64]) -> (f64, f64, f64, f64) {
    durations.sort_unstable();
    let avg = durations.iter().sum::<i64>() as f64 / durations.len().max(1) as f64;
    (avg, percentile(durations, 0.50), percentile(durations, 0.90), percentile(durations, 0.99))
}
