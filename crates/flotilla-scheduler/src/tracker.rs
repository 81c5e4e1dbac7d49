//! Status tracker: applies task status updates to the registry.
//!
//! Each update is handled in two steps. The reported state is applied
//! to the registry first, then the update's acknowledgement token (if
//! any) is acknowledged exactly once. A registry error is reported only
//! after the acknowledgement went out, so a bad update is never
//! redelivered forever.
//!
//! Only the last acknowledged token of each registered task is kept.
//! Updates for tasks the registry does not know are acknowledged on
//! every delivery.
//!
//! Failed and lost tasks are not resubmitted. Retrying means submitting
//! a new task id.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use flotilla_core::{AckToken, AgentId, TaskId, TaskState};
use flotilla_protocol::{CallFactory, StatusUpdate};
use flotilla_state::{RegistryError, TaskRegistry, Transition};

use crate::error::SchedulerResult;
use crate::transport::Transport;

/// What the tracker did with one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The registry applied (or already had) the reported state.
    Recorded(Transition),
    /// The reported state carries no lifecycle change.
    Informational(TaskState),
    /// The task is not in the registry; nothing changed.
    UnknownTask,
}

pub struct StatusTracker {
    registry: TaskRegistry,
    /// Last acknowledged token per registered task.
    acknowledged: Mutex<HashMap<TaskId, AckToken>>,
}

impl StatusTracker {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            acknowledged: Mutex::new(HashMap::new()),
        }
    }

    /// Apply `update` and acknowledge its token.
    pub async fn handle(
        &self,
        update: &StatusUpdate,
        calls: &CallFactory,
        transport: &dyn Transport,
    ) -> SchedulerResult<UpdateOutcome> {
        let applied = self.apply(update);
        let known = !matches!(applied, Ok(UpdateOutcome::UnknownTask));

        let known_agent = self
            .registry
            .get(&update.task_id)
            .and_then(|task| task.agent_id);
        let agent_id = update.agent_id.as_ref().or(known_agent.as_ref());
        if let Some(token) = &update.uuid {
            self.acknowledge(update, token, agent_id, known, calls, transport)
                .await?;
        }

        Ok(applied?)
    }

    /// Number of tasks with a remembered acknowledgement.
    pub fn acknowledged_count(&self) -> usize {
        self.acknowledged.lock().len()
    }

    fn apply(&self, update: &StatusUpdate) -> Result<UpdateOutcome, RegistryError> {
        let id = &update.task_id;
        if !self.registry.contains(id) {
            warn!(task_id = %id, state = %update.state, "status update for unknown task dropped");
            return Ok(UpdateOutcome::UnknownTask);
        }

        match update.state {
            TaskState::Pending | TaskState::Launching => {
                debug!(task_id = %id, state = %update.state, "task still starting");
                Ok(UpdateOutcome::Informational(update.state))
            }
            to => match self.registry.transition(id, to) {
                Ok(transition) => {
                    if to == TaskState::Failed || to == TaskState::Lost {
                        warn!(
                            task_id = %id,
                            state = %to,
                            message = update.message.as_deref().unwrap_or(""),
                            "task did not complete"
                        );
                    }
                    Ok(UpdateOutcome::Recorded(transition))
                }
                Err(e) => {
                    error!(task_id = %id, error = %e, "status update rejected");
                    Err(e)
                }
            },
        }
    }

    async fn acknowledge(
        &self,
        update: &StatusUpdate,
        token: &AckToken,
        agent_id: Option<&AgentId>,
        remember: bool,
        calls: &CallFactory,
        transport: &dyn Transport,
    ) -> SchedulerResult<()> {
        let Some(agent_id) = agent_id else {
            warn!(task_id = %update.task_id, "no agent id for acknowledgement, skipping");
            return Ok(());
        };
        let previous = if remember {
            let previous = self
                .acknowledged
                .lock()
                .insert(update.task_id.clone(), token.clone());
            if previous.as_ref() == Some(token) {
                debug!(task_id = %update.task_id, uuid = %token, "duplicate status update, already acknowledged");
                return Ok(());
            }
            previous
        } else {
            None
        };

        let call = calls.acknowledge(agent_id, &update.task_id, token);
        if let Err(e) = transport.send(call).await {
            // Forget the token so a redelivery is acknowledged again.
            if remember {
                let mut acknowledged = self.acknowledged.lock();
                match previous {
                    Some(prev) => acknowledged.insert(update.task_id.clone(), prev),
                    None => acknowledged.remove(&update.task_id),
                };
            }
            error!(task_id = %update.task_id, error = %e, "acknowledge failed");
            return Err(e.into());
        }
        debug!(task_id = %update.task_id, uuid = %token, "status acknowledged");
        Ok(())
    }
}
