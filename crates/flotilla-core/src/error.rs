//! Error types for core domain values.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or validating domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid range [{begin}, {end}]: begin exceeds end")]
    InvalidRange { begin: u64, end: u64 },

    #[error("ranges [{a_begin}, {a_end}] and [{b_begin}, {b_end}] overlap")]
    OverlappingRanges {
        a_begin: u64,
        a_end: u64,
        b_begin: u64,
        b_end: u64,
    },

    #[error("scalar resource {name} must be a finite non-negative number, got {value}")]
    NegativeScalar { name: String, value: f64 },

    #[error("config error: {0}")]
    Config(String),
}
