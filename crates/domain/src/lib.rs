//! Domain entities and invariants for the workflow engine.

#![forbid(unsafe_code)]

mod execution;
mod filter;
mod workflow;

pub use execution::{Execution, ExecutionInput, ExecutionStatus, StepExecution, StepStatus};
pub use filter::ExecutionFilter;
pub use workflow::{
    Edge, Node, NodeKind, Position, Workflow, WorkflowDefinition, WorkflowInput, WorkflowStatus,
    WorkflowVersion,
};
