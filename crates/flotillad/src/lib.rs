//! flotillad: command-line driver for the flotilla scheduler.

pub mod replay;

pub use replay::{LineTransport, ReplaySummary, replay};
