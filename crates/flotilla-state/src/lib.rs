//! flotilla-state: the task registry.
//!
//! The [`TaskRegistry`] is the single owner of task lifecycle state and
//! the only mutable state shared between the planning path and the
//! status-update path.
//!
//! # Concurrency
//!
//! The registry is `Clone` + `Send` + `Sync` (backed by an `Arc`). The
//! task map sits behind a read/write lock that is only write-locked to
//! insert; each task record has its own mutex, so transitions on
//! different task ids proceed in parallel while transitions on the same
//! id are serialized.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{Task, TaskRegistry, Transition};
