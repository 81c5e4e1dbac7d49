//! Flotilla placement: matching pending tasks to resource offers.
//!
//! This crate decides *where* tasks go. It never talks to the master and
//! never mutates the task registry; the offer cycle in
//! `flotilla-scheduler` applies the resulting plan.
//!
//! # Components
//!
//! - **`ledger`**: Normalizes one delivery of offers into per-offer
//!   resource vectors
//! - **`planner`**: Greedy FIFO placement producing assignments,
//!   residuals, and offers to decline

pub mod error;
pub mod ledger;
pub mod planner;

pub use error::{PlacementError, PlacementResult};
pub use ledger::{LedgerEntry, OfferResources, index_offers};
pub use planner::{Assignment, PlacementPlan, Residual, compute_plan};
