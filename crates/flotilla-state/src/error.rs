//! Error types for the task registry.

use flotilla_core::{CoreError, TaskId, TaskState};
use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by [`TaskRegistry`](crate::TaskRegistry) calls.
///
/// These are local to the failing call; the registry stays consistent.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task already registered: {0}")]
    DuplicateTask(TaskId),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("invalid task: {0}")]
    InvalidTask(#[from] CoreError),
}
