//! flotilla-scheduler: offer cycles, status tracking and the event loop.
//!
//! Sits between a master connection and the task registry. Decoded
//! events come in, outbound calls leave through a [`Transport`].
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── TaskRegistry (shared by both paths below)
//!   ├── Identity (framework id → CallFactory)
//!   ├── OfferCycle (offers → ledger → planner → accept/decline)
//!   ├── StatusTracker (updates → transitions → acknowledge)
//!   └── Transport (outbound calls)
//! ```

pub mod cycle;
pub mod driver;
pub mod error;
pub mod identity;
pub mod scheduler;
pub mod tracker;
pub mod transport;

pub use cycle::{CycleReport, OfferCycle};
pub use driver::run_event_loop;
pub use error::{SchedulerError, SchedulerResult};
pub use identity::Identity;
pub use scheduler::{EventOutcome, Scheduler};
pub use tracker::{StatusTracker, UpdateOutcome};
pub use transport::{ChannelTransport, Transport, TransportError};
