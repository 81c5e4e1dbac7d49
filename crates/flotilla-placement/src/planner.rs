//! Placement planner: greedy, offer-major, FIFO.
//!
//! Tasks are served in arrival order. Each task takes the first offer
//! (by arrival sequence) whose remaining CPU, memory, and port count
//! cover its demand. The planner carves the exact scalar amounts and the
//! lowest free ports, then keeps the remainder of that offer available
//! to later tasks in the same delivery.
//!
//! Nothing carries over between deliveries: offers that receive no task
//! are declined, and tasks that fit nowhere stay pending.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use flotilla_core::{
    AgentId, CPUS, MEM, OfferId, PORTS, RangeSet, Resource, TaskId, TaskSpec, TaskState,
};
use flotilla_state::Task;

use crate::error::{PlacementError, PlacementResult};
use crate::ledger::{LedgerEntry, OfferResources};

/// Slack for floating-point scalar comparisons.
const SCALAR_EPSILON: f64 = 1e-9;

/// One task bound to one offer with an exact resource carve-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub task_id: TaskId,
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub cpus: f64,
    pub mem: f64,
    /// Host ports in allocation order; the first is the primary port.
    pub ports: Vec<u64>,
}

impl Assignment {
    /// The carved resources: ports, then `cpus`, then `mem`.
    pub fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::ranges(PORTS, RangeSet::from_values(&self.ports)),
            Resource::Scalar {
                name: CPUS.to_string(),
                value: self.cpus,
            },
            Resource::Scalar {
                name: MEM.to_string(),
                value: self.mem,
            },
        ]
    }
}

/// What is left of an offer after planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub resources: OfferResources,
    /// Number of assignments carved from this offer.
    pub assigned: usize,
}

/// Result of one planning pass.
#[derive(Debug, Clone, Default)]
pub struct PlacementPlan {
    /// Assignments in task order.
    pub assignments: Vec<Assignment>,
    /// Every offer's leftover resources, in arrival order.
    pub residuals: Vec<Residual>,
    /// Tasks no offer could host; they stay pending.
    pub unplaced: Vec<TaskId>,
}

impl PlacementPlan {
    /// Assignments grouped by offer, offers in first-use order.
    pub fn by_offer(&self) -> IndexMap<OfferId, Vec<&Assignment>> {
        let mut grouped: IndexMap<OfferId, Vec<&Assignment>> = IndexMap::new();
        for assignment in &self.assignments {
            grouped
                .entry(assignment.offer_id.clone())
                .or_default()
                .push(assignment);
        }
        grouped
    }

    /// Offers that received no assignment, in arrival order.
    ///
    /// These are declined whole. Leftovers of used offers are released
    /// together with the accept of that offer.
    pub fn unused_offers(&self) -> Vec<OfferId> {
        self.residuals
            .iter()
            .filter(|r| r.assigned == 0)
            .map(|r| r.offer_id.clone())
            .collect()
    }

    pub fn residual(&self, offer_id: &OfferId) -> Option<&Residual> {
        self.residuals.iter().find(|r| &r.offer_id == offer_id)
    }
}

/// Plan pending tasks against one delivery of offers.
///
/// `tasks` may arrive in any order; they are served by arrival. Tasks
/// that are not `Pending` are ignored.
pub fn compute_plan(tasks: &[Task], mut offers: Vec<LedgerEntry>) -> PlacementPlan {
    let mut queue: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.state == TaskState::Pending)
        .collect();
    queue.sort_by_key(|t| t.arrival);
    offers.sort_by_key(|o| o.sequence);

    let mut assigned_counts = vec![0usize; offers.len()];
    let mut plan = PlacementPlan::default();

    for task in queue {
        match place_task(&task.spec, &mut offers) {
            Ok((index, assignment)) => {
                debug!(
                    task_id = %assignment.task_id,
                    offer_id = %assignment.offer_id,
                    cpus = assignment.cpus,
                    mem = assignment.mem,
                    ports = ?assignment.ports,
                    "task placed"
                );
                assigned_counts[index] += 1;
                plan.assignments.push(assignment);
            }
            Err(PlacementError::Infeasible { task_id }) => {
                warn!(%task_id, "no offer fits task, leaving it pending");
                plan.unplaced.push(task_id);
            }
        }
    }

    plan.residuals = offers
        .into_iter()
        .zip(assigned_counts)
        .map(|(entry, assigned)| Residual {
            offer_id: entry.offer_id,
            agent_id: entry.agent_id,
            resources: entry.available,
            assigned,
        })
        .collect();

    info!(
        placed = plan.assignments.len(),
        unplaced = plan.unplaced.len(),
        unused_offers = plan.unused_offers().len(),
        "placement computed"
    );
    plan
}

/// Carve `task` out of the first offer that fits, mutating its residual.
fn place_task(
    task: &TaskSpec,
    offers: &mut [LedgerEntry],
) -> PlacementResult<(usize, Assignment)> {
    let ports_needed = task.port_count();
    let index = offers
        .iter()
        .position(|o| fits(&o.available, task, ports_needed))
        .ok_or_else(|| PlacementError::Infeasible {
            task_id: task.id.clone(),
        })?;

    let entry = &mut offers[index];
    let ports = entry
        .available
        .ranges
        .get_mut(PORTS)
        .and_then(|set| set.take_lowest(ports_needed))
        .ok_or_else(|| PlacementError::Infeasible {
            task_id: task.id.clone(),
        })?;
    debit(&mut entry.available, CPUS, task.cpus);
    debit(&mut entry.available, MEM, task.mem);

    Ok((
        index,
        Assignment {
            task_id: task.id.clone(),
            offer_id: entry.offer_id.clone(),
            agent_id: entry.agent_id.clone(),
            cpus: task.cpus,
            mem: task.mem,
            ports,
        },
    ))
}

fn fits(available: &OfferResources, task: &TaskSpec, ports_needed: u64) -> bool {
    available.cpus() + SCALAR_EPSILON >= task.cpus
        && available.mem() + SCALAR_EPSILON >= task.mem
        && available.port_count() >= ports_needed
}

fn debit(available: &mut OfferResources, name: &str, amount: f64) {
    let slot = available.scalars.entry(name.to_string()).or_insert(0.0);
    *slot -= amount;
    if *slot < SCALAR_EPSILON {
        *slot = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::{Offer, Range};

    use crate::ledger::index_offers;

    fn offer(id: &str, sequence: u64, cpus: f64, mem: f64, ports: &[(u64, u64)]) -> Offer {
        let ranges = RangeSet::new(
            ports
                .iter()
                .map(|(b, e)| Range::new(*b, *e).unwrap())
                .collect(),
        )
        .unwrap();
        Offer {
            id: OfferId::from(id),
            agent_id: AgentId::new(format!("agent-{id}")),
            hostname: format!("host-{id}"),
            resources: vec![
                Resource::scalar(CPUS, cpus).unwrap(),
                Resource::scalar(MEM, mem).unwrap(),
                Resource::ranges(PORTS, ranges),
            ],
            sequence,
        }
    }

    fn pending(id: &str, arrival: u64, cpus: f64, mem: f64) -> Task {
        Task {
            spec: TaskSpec::new(id, cpus, mem),
            state: TaskState::Pending,
            arrival,
            agent_id: None,
        }
    }

    #[test]
    fn single_task_carves_lowest_port_and_leaves_residual() {
        let offers = index_offers(&[offer("o1", 0, 2.0, 1024.0, &[(31000, 31001)])]);
        let plan = compute_plan(&[pending("t1", 0, 1.0, 512.0)], offers);

        assert_eq!(plan.assignments.len(), 1);
        let a = &plan.assignments[0];
        assert_eq!(a.offer_id.as_str(), "o1");
        assert_eq!(a.cpus, 1.0);
        assert_eq!(a.mem, 512.0);
        assert_eq!(a.ports, vec![31000]);

        let residual = plan.residual(&OfferId::from("o1")).unwrap();
        assert_eq!(residual.resources.cpus(), 1.0);
        assert_eq!(residual.resources.mem(), 512.0);
        let left = residual.resources.range_set(PORTS).unwrap();
        assert_eq!(left.ranges(), &[Range::new(31001, 31001).unwrap()]);
        assert_eq!(residual.assigned, 1);
        assert!(plan.unused_offers().is_empty());
    }

    #[test]
    fn oversized_task_stays_unplaced() {
        let offers = index_offers(&[
            offer("o1", 0, 2.0, 4096.0, &[(1, 100)]),
            offer("o2", 1, 2.0, 4096.0, &[(1, 100)]),
        ]);
        let plan = compute_plan(&[pending("big", 0, 4.0, 128.0)], offers);

        assert!(plan.assignments.is_empty());
        assert_eq!(plan.unplaced, vec![TaskId::from("big")]);
        assert_eq!(plan.unused_offers().len(), 2);
    }

    #[test]
    fn remainder_is_reused_within_delivery() {
        let offers = index_offers(&[offer("o1", 0, 2.0, 1024.0, &[(31000, 31009)])]);
        let tasks = [pending("t1", 0, 1.0, 512.0), pending("t2", 1, 1.0, 512.0)];
        let plan = compute_plan(&tasks, offers);

        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.assignments[0].ports, vec![31000]);
        assert_eq!(plan.assignments[1].ports, vec![31001]);
        let residual = plan.residual(&OfferId::from("o1")).unwrap();
        assert_eq!(residual.resources.cpus(), 0.0);
        assert_eq!(residual.assigned, 2);
        assert_eq!(plan.by_offer().len(), 1);
    }

    #[test]
    fn exact_fit_consumes_offer_without_decline() {
        let offers = index_offers(&[offer("o1", 0, 1.0, 256.0, &[(5000, 5000)])]);
        let plan = compute_plan(&[pending("t1", 0, 1.0, 256.0)], offers);

        assert_eq!(plan.assignments.len(), 1);
        assert!(plan.unused_offers().is_empty());
        assert!(plan.residual(&OfferId::from("o1")).unwrap().resources.is_exhausted());
    }

    #[test]
    fn tasks_served_in_arrival_order() {
        // Only room for one task; the earlier arrival wins even though it
        // is listed second.
        let offers = index_offers(&[offer("o1", 0, 1.0, 512.0, &[(1, 10)])]);
        let tasks = [pending("late", 5, 1.0, 512.0), pending("early", 2, 1.0, 512.0)];
        let plan = compute_plan(&tasks, offers);

        assert_eq!(plan.assignments[0].task_id.as_str(), "early");
        assert_eq!(plan.unplaced, vec![TaskId::from("late")]);
    }

    #[test]
    fn offers_scanned_in_arrival_order() {
        let offers = index_offers(&[
            offer("second", 9, 4.0, 4096.0, &[(100, 200)]),
            offer("first", 1, 4.0, 4096.0, &[(300, 400)]),
        ]);
        let plan = compute_plan(&[pending("t1", 0, 1.0, 1.0)], offers);

        assert_eq!(plan.assignments[0].offer_id.as_str(), "first");
        assert_eq!(plan.assignments[0].ports, vec![300]);
        assert_eq!(plan.unused_offers(), vec![OfferId::from("second")]);
    }

    #[test]
    fn auxiliary_port_needs_two_ports() {
        let offers = index_offers(&[
            offer("narrow", 0, 4.0, 4096.0, &[(8000, 8000)]),
            offer("wide", 1, 4.0, 4096.0, &[(9000, 9000), (9100, 9105)]),
        ]);
        let mut task = pending("vnc", 0, 1.0, 256.0);
        task.spec = task.spec.with_auxiliary_port(true);
        let plan = compute_plan(&[task], offers);

        let a = &plan.assignments[0];
        assert_eq!(a.offer_id.as_str(), "wide");
        assert_eq!(a.ports, vec![9000, 9100]);
    }

    #[test]
    fn offer_without_ports_is_never_a_candidate() {
        let o = Offer {
            id: OfferId::from("bare"),
            agent_id: AgentId::from("a"),
            hostname: "h".to_string(),
            resources: vec![
                Resource::scalar(CPUS, 8.0).unwrap(),
                Resource::scalar(MEM, 8192.0).unwrap(),
            ],
            sequence: 0,
        };
        let plan = compute_plan(&[pending("t1", 0, 1.0, 1.0)], index_offers(&[o]));
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.unused_offers(), vec![OfferId::from("bare")]);
    }

    #[test]
    fn non_pending_tasks_are_ignored() {
        let offers = index_offers(&[offer("o1", 0, 4.0, 4096.0, &[(1, 10)])]);
        let mut running = pending("r", 0, 1.0, 1.0);
        running.state = TaskState::Running;
        let plan = compute_plan(&[running], offers);
        assert!(plan.assignments.is_empty());
        assert!(plan.unplaced.is_empty());
    }

    #[test]
    fn fractional_cpus_tolerate_rounding() {
        let offers = index_offers(&[offer("o1", 0, 0.3, 1024.0, &[(1, 10)])]);
        let tasks = [pending("a", 0, 0.1, 1.0), pending("b", 1, 0.2, 1.0)];
        let plan = compute_plan(&tasks, offers);
        assert_eq!(plan.assignments.len(), 2);
    }

    #[test]
    fn assignment_resources_list_ports_cpus_mem() {
        let a = Assignment {
            task_id: TaskId::from("t"),
            offer_id: OfferId::from("o"),
            agent_id: AgentId::from("a"),
            cpus: 0.5,
            mem: 64.0,
            ports: vec![31001, 31000],
        };
        let resources = a.resources();
        let names: Vec<&str> = resources.iter().map(Resource::name).collect();
        assert_eq!(names, vec![PORTS, CPUS, MEM]);
        match &resources[0] {
            Resource::Ranges { ranges, .. } => {
                assert_eq!(ranges.ranges(), &[Range::new(31000, 31001).unwrap()]);
            }
            other => panic!("expected ranges, got {other:?}"),
        }
    }
}
