//! flotilla-core: shared domain types and configuration.
//!
//! Every other flotilla crate speaks in terms of the types defined here:
//! offers and their typed resources, task specifications and lifecycle
//! states, and the TOML configuration consumed by the daemon.

pub mod config;
pub mod error;
pub mod types;

pub use config::FlotillaConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
