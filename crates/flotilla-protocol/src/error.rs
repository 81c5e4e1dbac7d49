//! Protocol error types.

use flotilla_core::CoreError;
use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid resource {name}: {source}")]
    InvalidResource {
        name: String,
        #[source]
        source: CoreError,
    },

    #[error("accept call needs at least one launch")]
    EmptyAccept,
}
