//! TaskRegistry: in-memory task lifecycle store.
//!
//! Holds every task the scheduler has been asked to run, keyed by task
//! id, together with its lifecycle state and arrival order. Only the
//! planning path (Pending → Launching) and the status path (everything
//! else) write to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use flotilla_core::{AgentId, TaskId, TaskSpec, TaskState};

use crate::error::{RegistryError, RegistryResult};

/// A registered task and its lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub spec: TaskSpec,
    pub state: TaskState,
    /// Registration order; the planner serves tasks FIFO by this value.
    pub arrival: u64,
    /// Agent the task was launched on, once launched.
    pub agent_id: Option<AgentId>,
}

impl Task {
    pub fn id(&self) -> &TaskId {
        &self.spec.id
    }
}

/// Outcome of a successful [`TaskRegistry::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The task moved to a new state.
    Applied { from: TaskState, to: TaskState },
    /// The task was already in the requested state; nothing changed.
    Unchanged(TaskState),
}

struct Inner {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<Task>>>>,
    next_arrival: AtomicU64,
}

/// Thread-safe task registry.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(HashMap::new()),
                next_arrival: AtomicU64::new(0),
            }),
        }
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Register a new task in the `Pending` state.
    pub fn put(&self, spec: TaskSpec) -> RegistryResult<()> {
        spec.validate()?;
        let mut tasks = self.inner.tasks.write();
        if tasks.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateTask(spec.id));
        }
        let arrival = self.inner.next_arrival.fetch_add(1, Ordering::Relaxed);
        let id = spec.id.clone();
        tasks.insert(
            id.clone(),
            Arc::new(Mutex::new(Task {
                spec,
                state: TaskState::Pending,
                arrival,
                agent_id: None,
            })),
        );
        debug!(task_id = %id, arrival, "task registered");
        Ok(())
    }

    /// Move a task to `to`, enforcing the lifecycle state machine.
    ///
    /// Re-applying the state a task is already in is accepted as
    /// [`Transition::Unchanged`] for `Running` and terminal states, which
    /// makes redelivered status updates harmless. `Pending → Launching`
    /// succeeds exactly once.
    pub fn transition(&self, id: &TaskId, to: TaskState) -> RegistryResult<Transition> {
        let slot = self.slot(id)?;
        let mut task = slot.lock();
        let outcome = check_transition(id, task.state, to)?;
        if let Transition::Applied { from, to } = outcome {
            task.state = to;
            info!(task_id = %id, %from, %to, "task transitioned");
        }
        Ok(outcome)
    }

    /// Mark a pending task as launching on `agent_id`.
    pub fn launch(&self, id: &TaskId, agent_id: &AgentId) -> RegistryResult<Transition> {
        let slot = self.slot(id)?;
        let mut task = slot.lock();
        let outcome = check_transition(id, task.state, TaskState::Launching)?;
        task.state = TaskState::Launching;
        task.agent_id = Some(agent_id.clone());
        info!(task_id = %id, agent_id = %agent_id, "task launching");
        Ok(outcome)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Snapshot of a single task.
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        let tasks = self.inner.tasks.read();
        tasks.get(id).map(|slot| slot.lock().clone())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.inner.tasks.read().contains_key(id)
    }

    /// Snapshot of all tasks in `state`, in arrival order.
    pub fn list_by_state(&self, state: TaskState) -> Vec<Task> {
        let tasks = self.inner.tasks.read();
        let mut matching: Vec<Task> = tasks
            .values()
            .filter_map(|slot| {
                let task = slot.lock();
                (task.state == state).then(|| task.clone())
            })
            .collect();
        matching.sort_by_key(|t| t.arrival);
        matching
    }

    /// Number of tasks per lifecycle state.
    pub fn state_counts(&self) -> HashMap<TaskState, usize> {
        let tasks = self.inner.tasks.read();
        let mut counts = HashMap::new();
        for slot in tasks.values() {
            *counts.entry(slot.lock().state).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &TaskId) -> RegistryResult<Arc<Mutex<Task>>> {
        self.inner
            .tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTask(id.clone()))
    }
}

/// Validate `from → to` against the lifecycle state machine.
fn check_transition(id: &TaskId, from: TaskState, to: TaskState) -> RegistryResult<Transition> {
    use TaskState::*;

    let allowed = match (from, to) {
        (a, b) if a == b => {
            return if a.is_terminal() || a == Running {
                Ok(Transition::Unchanged(a))
            } else {
                Err(illegal(id, from, to))
            };
        }
        (Pending, Launching) => true,
        (Launching, Running) => true,
        (Launching | Running, b) if b.is_terminal() => true,
        _ => false,
    };

    if allowed {
        Ok(Transition::Applied { from, to })
    } else {
        Err(illegal(id, from, to))
    }
}

fn illegal(id: &TaskId, from: TaskState, to: TaskState) -> RegistryError {
    RegistryError::IllegalTransition {
        task_id: id.clone(),
        from,
        to,
    }
}
