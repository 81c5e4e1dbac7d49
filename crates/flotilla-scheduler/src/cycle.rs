//! Offer cycle controller.
//!
//! One delivery of offers runs through the ledger and the planner, then:
//!
//! - every placed task is marked `Launching` in the registry,
//! - every offer with assignments gets one `ACCEPT` carrying all of its
//!   launches (the unused remainder is released with it),
//! - every offer without assignments is declined in a single `DECLINE`.
//!
//! Offers never carry over to the next delivery. Tasks left pending are
//! planned again, whole, when the next offers arrive.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use flotilla_core::{Offer, OfferId, TaskId, TaskSpec, TaskState};
use flotilla_placement::{Assignment, compute_plan, index_offers};
use flotilla_protocol::CallFactory;
use flotilla_state::TaskRegistry;

use crate::error::SchedulerResult;
use crate::transport::Transport;

/// Summary of one offer cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Tasks handed to the master, in launch order.
    pub launched: Vec<TaskId>,
    /// Offers declined whole.
    pub declined: Vec<OfferId>,
    /// Offers accepted with at least one launch.
    pub accepted_offers: Vec<OfferId>,
    /// Tasks no offer could host; still pending.
    pub unplaced: Vec<TaskId>,
    /// Offers skipped because they were rescinded.
    pub dropped_offers: Vec<OfferId>,
}

pub struct OfferCycle {
    registry: TaskRegistry,
    rescinded: Mutex<HashSet<OfferId>>,
}

impl OfferCycle {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            rescinded: Mutex::new(HashSet::new()),
        }
    }

    /// Remember a rescinded offer so the next delivery skips it.
    pub fn rescind(&self, offer_id: OfferId) {
        warn!(%offer_id, "offer rescinded");
        self.rescinded.lock().insert(offer_id);
    }

    /// Run one cycle over `offers`.
    pub async fn run(
        &self,
        offers: Vec<Offer>,
        calls: &CallFactory,
        transport: &dyn Transport,
    ) -> SchedulerResult<CycleReport> {
        let mut report = CycleReport::default();
        let offers = self.drop_rescinded(offers, &mut report);

        let pending = self.registry.list_by_state(TaskState::Pending);
        let plan = compute_plan(&pending, index_offers(&offers));
        let specs: HashMap<&TaskId, &TaskSpec> =
            pending.iter().map(|t| (t.id(), &t.spec)).collect();

        report.unplaced = plan.unplaced.clone();
        let mut to_decline = plan.unused_offers();

        for (offer_id, assignments) in plan.by_offer() {
            let launches = self.mark_launching(&assignments, &specs);
            if launches.is_empty() {
                warn!(%offer_id, "no launch left for offer, declining it");
                to_decline.push(offer_id);
                continue;
            }

            let call = calls.accept(&launches)?;
            if let Err(e) = transport.send(call).await {
                error!(%offer_id, error = %e, "accept failed");
                // The master never saw these launches.
                for (assignment, _) in &launches {
                    if let Err(e) = self.registry.transition(&assignment.task_id, TaskState::Lost) {
                        error!(task_id = %assignment.task_id, error = %e, "could not mark task lost");
                    }
                }
                return Err(e.into());
            }

            debug!(%offer_id, tasks = launches.len(), "offer accepted");
            report
                .launched
                .extend(launches.iter().map(|(a, _)| a.task_id.clone()));
            report.accepted_offers.push(offer_id);
        }

        if !to_decline.is_empty() {
            transport.send(calls.decline(&to_decline)).await?;
            report.declined = to_decline;
        }

        info!(
            launched = report.launched.len(),
            accepted = report.accepted_offers.len(),
            declined = report.declined.len(),
            unplaced = report.unplaced.len(),
            dropped = report.dropped_offers.len(),
            "offer cycle complete"
        );
        Ok(report)
    }

    /// Skip offers rescinded since the last cycle. The remembered ids are
    /// cleared either way: offers never carry over, so an id not in this
    /// delivery was already handled and will not come back.
    fn drop_rescinded(&self, offers: Vec<Offer>, report: &mut CycleReport) -> Vec<Offer> {
        let rescinded = std::mem::take(&mut *self.rescinded.lock());
        if rescinded.is_empty() {
            return offers;
        }
        offers
            .into_iter()
            .filter(|offer| {
                if rescinded.contains(&offer.id) {
                    warn!(offer_id = %offer.id, "skipping rescinded offer");
                    report.dropped_offers.push(offer.id.clone());
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    /// Offer ids rescinded and not yet consumed by a cycle.
    pub fn rescinded_count(&self) -> usize {
        self.rescinded.lock().len()
    }

    /// Move each assigned task to `Launching`. Tasks the registry refuses
    /// (killed or relaunched in the meantime) are left out.
    fn mark_launching<'p>(
        &self,
        assignments: &[&'p Assignment],
        specs: &HashMap<&TaskId, &'p TaskSpec>,
    ) -> Vec<(&'p Assignment, &'p TaskSpec)> {
        let mut launches = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let Some(spec) = specs.get(&assignment.task_id) else {
                continue;
            };
            match self.registry.launch(&assignment.task_id, &assignment.agent_id) {
                Ok(_) => launches.push((*assignment, *spec)),
                Err(e) => {
                    error!(task_id = %assignment.task_id, error = %e, "launch rejected by registry");
                }
            }
        }
        launches
    }
}
