//! Placement error types.

use flotilla_core::TaskId;
use thiserror::Error;

pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors produced while placing a single task.
///
/// Infeasibility is recoverable: the task stays pending and is retried
/// whole on the next offer delivery.
#[derive(Debug, Error, PartialEq)]
pub enum PlacementError {
    #[error("no offer can host task {task_id}")]
    Infeasible { task_id: TaskId },
}
