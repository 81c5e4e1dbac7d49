//! Scheduler error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the scheduler to its caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no framework id yet; wait for the subscribed event")]
    NotSubscribed,

    #[error("registry error: {0}")]
    Registry(#[from] flotilla_state::RegistryError),

    #[error("protocol error: {0}")]
    Protocol(#[from] flotilla_protocol::ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
