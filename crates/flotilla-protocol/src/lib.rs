//! flotilla-protocol: the scheduler's message vocabulary.
//!
//! Outbound [`Call`]s (subscribe, accept, decline, acknowledge, kill) and
//! inbound [`Event`]s (subscribed, offers, rescind, update, heartbeat,
//! error). Message and resource type tags are closed enums that exist
//! only here; the rest of the workspace works with `flotilla-core`
//! values.
//!
//! # Modules
//!
//! - **`wire`**: serde shapes of the JSON protocol
//! - **`calls`**: building calls from plans and task specs
//! - **`events`**: decoding master events into core values

pub mod calls;
pub mod error;
pub mod events;
pub mod wire;

pub use calls::{CallFactory, subscribe, unique_offer_ids};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{Event, EventDecoder, StatusUpdate};
pub use wire::{Call, CallBody};
