use chrono::{DateTime, Utc};
use orbitflow_core::{AppError, AppResult, WorkflowId};

use crate::ExecutionStatus;

/// Filter criteria for listing executions, validated as a unit since several
/// fields constrain each other (`end_date` vs `start_date`, `max` vs `min`).
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Restrict to one workflow.
    pub workflow_id: Option<WorkflowId>,
    /// Restrict to one execution status.
    pub status: Option<ExecutionStatus>,
    /// Restrict to one trigger type.
    pub trigger_type: Option<String>,
    /// Restrict to executions created on or after this timestamp.
    pub start_date: Option<DateTime<Utc>>,
    /// Restrict to executions created on or before this timestamp.
    pub end_date: Option<DateTime<Utc>>,
    /// Restrict to executions whose error message contains this substring.
    pub error_search: Option<String>,
    /// Restrict to executions whose id starts with this prefix.
    pub execution_id_prefix: Option<String>,
    /// Restrict to executions that ran at least this long.
    pub min_duration_ms: Option<i64>,
    /// Restrict to executions that ran at most this long.
    pub max_duration_ms: Option<i64>,
}

impl ExecutionFilter {
    /// Validates cross-field constraints.
    pub fn validate(&self) -> AppResult<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && end < start
        {
            return Err(AppError::Validation(
                "end_date must not be before start_date".to_owned(),
            ));
        }

        if let Some(min_duration_ms) = self.min_duration_ms
            && min_duration_ms < 0
        {
            return Err(AppError::Validation(
                "min_duration_ms must not be negative".to_owned(),
            ));
        }

        if let Some(max_duration_ms) = self.max_duration_ms
            && max_duration_ms < 0
        {
            return Err(AppError::Validation(
                "max_duration_ms must not be negative".to_owned(),
            ));
        }

        if let (Some(min_duration_ms), Some(max_duration_ms)) =
            (self.min_duration_ms, self.max_duration_ms)
            && max_duration_ms < min_duration_ms
        {
            return Err(AppError::Validation(
                "max_duration_ms must not be less than min_duration_ms".to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_valid() {
        assert!(ExecutionFilter::default().validate().is_ok());
    }

    #[test]
    fn rejects_end_date_before_start_date() {
        let filter = ExecutionFilter {
            start_date: Some(Utc::now()),
            end_date: Some(Utc::now() - chrono::Duration::days(1)),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_negative_duration_bounds() {
        let filter = ExecutionFilter {
            min_duration_ms: Some(-1),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_max_duration_below_min_duration() {
        let filter = ExecutionFilter {
            min_duration_ms: Some(500),
            max_duration_ms: Some(100),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(AppError::Validation(_))));
    }
}
