//! Decoding master events.
//!
//! Inbound JSON is parsed into the wire shapes below and converted into
//! [`Event`] values. Offers get their arrival sequence here, so one
//! [`EventDecoder`] must see every event of a connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flotilla_core::{AckToken, AgentId, FrameworkId, Offer, OfferId, TaskId, TaskState};

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{Id, WireResource};

// ── Wire shapes ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSubscribed {
    pub framework_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOffer {
    pub id: Id,
    pub agent_id: Id,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<WireResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOffers {
    #[serde(default)]
    pub offers: Vec<WireOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRescind {
    pub offer_id: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireTaskState {
    TaskStaging,
    TaskStarting,
    TaskRunning,
    TaskKilling,
    TaskFinished,
    TaskFailed,
    TaskError,
    TaskKilled,
    TaskLost,
    TaskDropped,
    TaskUnreachable,
    TaskGone,
    TaskGoneByOperator,
    TaskUnknown,
}

impl From<WireTaskState> for TaskState {
    fn from(state: WireTaskState) -> Self {
        use WireTaskState::*;
        match state {
            TaskStaging | TaskStarting => TaskState::Launching,
            TaskRunning | TaskKilling => TaskState::Running,
            TaskFinished => TaskState::Finished,
            TaskFailed | TaskError => TaskState::Failed,
            TaskKilled => TaskState::Killed,
            TaskLost | TaskDropped | TaskUnreachable | TaskGone | TaskGoneByOperator
            | TaskUnknown => TaskState::Lost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTaskStatus {
    pub task_id: Id,
    pub state: WireTaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireUpdate {
    pub status: WireTaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
}

/// An inbound event, tagged by `type`. Types this scheduler does not
/// handle decode as `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireEvent {
    Subscribed { subscribed: WireSubscribed },
    Offers { offers: WireOffers },
    Rescind { rescind: WireRescind },
    Update { update: WireUpdate },
    Heartbeat,
    Error { error: WireError },
    #[serde(other)]
    Unknown,
}

// ── Core events ───────────────────────────────────────────────────

/// A status report for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub agent_id: Option<AgentId>,
    pub state: TaskState,
    /// Present when the master expects an acknowledgement.
    pub uuid: Option<AckToken>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Subscribed {
        framework_id: FrameworkId,
        heartbeat_interval: Option<Duration>,
    },
    Offers(Vec<Offer>),
    Rescind(OfferId),
    Update(StatusUpdate),
    Heartbeat,
    Error(String),
    Unknown,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Subscribed { .. } => "subscribed",
            Event::Offers(_) => "offers",
            Event::Rescind(_) => "rescind",
            Event::Update(_) => "update",
            Event::Heartbeat => "heartbeat",
            Event::Error(_) => "error",
            Event::Unknown => "unknown",
        }
    }
}

/// Stateful decoder that stamps offers with a monotonic arrival sequence.
#[derive(Debug, Default)]
pub struct EventDecoder {
    next_sequence: AtomicU64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one JSON event.
    pub fn decode(&self, json: &str) -> ProtocolResult<Event> {
        let wire: WireEvent =
            serde_json::from_str(json).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        self.convert(wire)
    }

    /// Convert an already-parsed wire event.
    pub fn convert(&self, wire: WireEvent) -> ProtocolResult<Event> {
        let event = match wire {
            WireEvent::Subscribed { subscribed } => Event::Subscribed {
                framework_id: subscribed.framework_id.into(),
                heartbeat_interval: subscribed
                    .heartbeat_interval_seconds
                    .and_then(|s| Duration::try_from_secs_f64(s).ok()),
            },
            WireEvent::Offers { offers } => Event::Offers(
                offers
                    .offers
                    .into_iter()
                    .map(|o| self.offer(o))
                    .collect::<ProtocolResult<_>>()?,
            ),
            WireEvent::Rescind { rescind } => Event::Rescind(rescind.offer_id.into()),
            WireEvent::Update { update } => {
                let status = update.status;
                Event::Update(StatusUpdate {
                    task_id: status.task_id.into(),
                    agent_id: status.agent_id.map(Into::into),
                    state: status.state.into(),
                    uuid: status.uuid.filter(|u| !u.is_empty()).map(AckToken::from),
                    message: status.message,
                })
            }
            WireEvent::Heartbeat => Event::Heartbeat,
            WireEvent::Error { error } => Event::Error(error.message),
            WireEvent::Unknown => Event::Unknown,
        };
        debug!(kind = event.kind(), "event decoded");
        Ok(event)
    }

    fn offer(&self, wire: WireOffer) -> ProtocolResult<Offer> {
        let mut resources = Vec::with_capacity(wire.resources.len());
        for resource in &wire.resources {
            if let Some(r) = resource.to_resource()? {
                resources.push(r);
            }
        }
        Ok(Offer {
            id: wire.id.into(),
            agent_id: wire.agent_id.into(),
            hostname: wire.hostname,
            resources,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        })
    }
}
