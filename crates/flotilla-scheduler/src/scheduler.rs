//! Scheduler: the entry point tying registry, tracker and cycles together.
//!
//! The `Scheduler` owns no network I/O. It turns caller requests and
//! decoded master events into registry changes and outbound calls, and
//! hands the calls to its [`Transport`].

use std::sync::Arc;

use tracing::{debug, error, info};

use flotilla_core::config::{FlotillaConfig, FrameworkConfig};
use flotilla_core::{FrameworkId, TaskId, TaskSpec, TaskState};
use flotilla_protocol::Event;
use flotilla_protocol::calls::subscribe;
use flotilla_state::{RegistryError, TaskRegistry, Transition};

use crate::cycle::{CycleReport, OfferCycle};
use crate::error::SchedulerResult;
use crate::identity::Identity;
use crate::tracker::{StatusTracker, UpdateOutcome};
use crate::transport::Transport;

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Subscribed(FrameworkId),
    Cycle(CycleReport),
    Update(UpdateOutcome),
    Rescinded,
    Ignored,
}

pub struct Scheduler {
    framework: FrameworkConfig,
    registry: TaskRegistry,
    identity: Identity,
    tracker: StatusTracker,
    cycle: OfferCycle,
    transport: Arc<dyn Transport>,
}

impl Scheduler {
    pub fn new(config: &FlotillaConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = TaskRegistry::new();
        Self {
            framework: config.framework.clone(),
            identity: Identity::new(config.offers.refuse_seconds, config.container.clone()),
            tracker: StatusTracker::new(registry.clone()),
            cycle: OfferCycle::new(registry.clone()),
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.identity.framework_id()
    }

    /// Send the subscribe call that opens the event stream.
    pub async fn subscribe(&self) -> SchedulerResult<()> {
        self.transport.send(subscribe(&self.framework)).await?;
        info!(framework = %self.framework.name, "subscribe sent");
        Ok(())
    }

    /// Queue a task for placement.
    pub fn submit(&self, spec: TaskSpec) -> SchedulerResult<()> {
        let id = spec.id.clone();
        self.registry.put(spec)?;
        info!(task_id = %id, "task submitted");
        Ok(())
    }

    /// Kill a launched task.
    ///
    /// A task that already reached a terminal state is left alone and no
    /// call is sent. A task that was never launched cannot be killed.
    /// The registry records `Killed` only once the KILL call went out, so
    /// a kill whose send failed can be retried.
    pub async fn kill(&self, id: &TaskId) -> SchedulerResult<Transition> {
        let task = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::UnknownTask(id.clone()))?;
        if task.state.is_terminal() {
            debug!(task_id = %id, state = %task.state, "kill on finished task ignored");
            return Ok(Transition::Unchanged(task.state));
        }
        if task.state == TaskState::Pending {
            return Err(RegistryError::IllegalTransition {
                task_id: id.clone(),
                from: task.state,
                to: TaskState::Killed,
            }
            .into());
        }

        let calls = self.identity.calls()?;
        self.transport
            .send(calls.kill(id, task.agent_id.as_ref()))
            .await?;
        info!(task_id = %id, "kill sent");

        match self.registry.transition(id, TaskState::Killed) {
            Ok(t) => Ok(t),
            // Finished on its own while the kill was in flight.
            Err(RegistryError::IllegalTransition { from, .. }) if from.is_terminal() => {
                Ok(Transition::Unchanged(from))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle one decoded master event.
    pub async fn handle_event(&self, event: Event) -> SchedulerResult<EventOutcome> {
        match event {
            Event::Subscribed {
                framework_id,
                heartbeat_interval,
            } => {
                debug!(?heartbeat_interval, "subscription confirmed");
                self.identity.establish(framework_id.clone());
                Ok(EventOutcome::Subscribed(framework_id))
            }
            Event::Offers(offers) => {
                let calls = self.identity.calls()?;
                let report = self.cycle.run(offers, &calls, self.transport.as_ref()).await?;
                Ok(EventOutcome::Cycle(report))
            }
            Event::Rescind(offer_id) => {
                self.cycle.rescind(offer_id);
                Ok(EventOutcome::Rescinded)
            }
            Event::Update(update) => {
                let calls = self.identity.calls()?;
                let outcome = self
                    .tracker
                    .handle(&update, &calls, self.transport.as_ref())
                    .await?;
                Ok(EventOutcome::Update(outcome))
            }
            Event::Heartbeat => {
                debug!("heartbeat");
                Ok(EventOutcome::Ignored)
            }
            Event::Error(message) => {
                error!(%message, "master reported an error");
                Ok(EventOutcome::Ignored)
            }
            Event::Unknown => {
                debug!("unhandled event type ignored");
                Ok(EventOutcome::Ignored)
            }
        }
    }
}
