//! End-to-end scheduler behavior against a recording transport.
//!
//! Events are fed as master JSON through the protocol decoder, so these
//! tests cover decoding, planning, registry updates and call encoding
//! together.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use flotilla_core::config::FlotillaConfig;
use flotilla_core::{TaskId, TaskSpec, TaskState};
use flotilla_protocol::wire::Operation;
use flotilla_protocol::{Call, CallBody, Event, EventDecoder};
use flotilla_scheduler::{
    EventOutcome, Scheduler, SchedulerError, Transport, TransportError, run_event_loop,
};
use flotilla_state::{RegistryError, Transition};

#[derive(Clone, Default)]
struct MockTransport {
    sent: Arc<Mutex<Vec<Call>>>,
}

impl MockTransport {
    /// Calls as they would appear on the wire, decoded back.
    fn wire_calls(&self) -> Vec<Call> {
        self.sent
            .lock()
            .iter()
            .map(|c| Call::from_json(&c.to_json().unwrap()).unwrap())
            .collect()
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(Call::kind).collect()
    }

    fn assert_sent_count_eq(&self, expected: usize) {
        let got = self.sent.lock().len();
        assert_eq!(got, expected, "expected {expected} calls, got {got}");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, call: Call) -> Result<(), TransportError> {
        self.sent.lock().push(call);
        Ok(())
    }
}

struct Harness {
    scheduler: Arc<Scheduler>,
    transport: MockTransport,
    decoder: EventDecoder,
}

impl Harness {
    async fn subscribed() -> Self {
        let transport = MockTransport::default();
        let scheduler = Arc::new(Scheduler::new(
            &FlotillaConfig::default(),
            Arc::new(transport.clone()),
        ));
        let harness = Self {
            scheduler,
            transport,
            decoder: EventDecoder::new(),
        };
        harness
            .feed(r#"{"type":"SUBSCRIBED","subscribed":{"framework_id":{"value":"fw-1"}}}"#)
            .await
            .unwrap();
        harness
    }

    async fn feed(&self, json: &str) -> Result<EventOutcome, SchedulerError> {
        let event = self.decoder.decode(json).unwrap();
        self.scheduler.handle_event(event).await
    }

    fn state(&self, id: &str) -> TaskState {
        self.scheduler.registry().get(&TaskId::from(id)).unwrap().state
    }
}

fn offer_json(id: &str, cpus: f64, mem: f64, begin: u64, end: u64) -> String {
    format!(
        r#"{{"type":"OFFERS","offers":{{"offers":[{{
            "id":{{"value":"{id}"}},"agent_id":{{"value":"agent-{id}"}},"hostname":"host-{id}",
            "resources":[
                {{"name":"cpus","type":"SCALAR","scalar":{{"value":{cpus}}}}},
                {{"name":"mem","type":"SCALAR","scalar":{{"value":{mem}}}}},
                {{"name":"ports","type":"RANGES","ranges":{{"range":[{{"begin":{begin},"end":{end}}}]}}}}
            ]}}]}}}}"#
    )
}

fn update_json(task: &str, agent: &str, state: &str, uuid: &str) -> String {
    format!(
        r#"{{"type":"UPDATE","update":{{"status":{{
            "task_id":{{"value":"{task}"}},"agent_id":{{"value":"{agent}"}},
            "state":"{state}","uuid":"{uuid}"}}}}}}"#
    )
}

#[tokio::test]
async fn single_task_takes_lowest_port_and_leaves_no_offer_behind() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 512.0)).unwrap();

    let outcome = h.feed(&offer_json("o1", 2.0, 1024.0, 31000, 31001)).await.unwrap();
    let EventOutcome::Cycle(report) = outcome else {
        panic!("expected a cycle report");
    };
    assert_eq!(report.launched, vec![TaskId::from("t1")]);
    assert!(report.declined.is_empty());

    let calls = h.transport.wire_calls();
    assert_eq!(calls.len(), 1);
    let CallBody::Accept { accept } = &calls[0].body else {
        panic!("expected accept");
    };
    let [Operation::Launch { launch }] = &accept.operations[..] else {
        panic!("expected one launch");
    };
    let info = &launch.task_infos[0];
    let resources: Vec<(String, Option<f64>, Option<u64>)> = info
        .resources
        .iter()
        .map(|r| {
            (
                r.name.clone(),
                r.scalar.as_ref().map(|s| s.value),
                r.ranges.as_ref().map(|rs| rs.range[0].begin),
            )
        })
        .collect();
    assert_eq!(
        resources,
        vec![
            ("ports".to_string(), None, Some(31000)),
            ("cpus".to_string(), Some(1.0), None),
            ("mem".to_string(), Some(512.0), None),
        ]
    );
    assert_eq!(h.state("t1"), TaskState::Launching);

    // Nothing is retained: the next delivery starts from scratch.
    h.scheduler.submit(TaskSpec::new("t2", 1.0, 512.0)).unwrap();
    let EventOutcome::Cycle(next) = h.feed(&offer_json("o2", 0.5, 1024.0, 31000, 31001)).await.unwrap()
    else {
        panic!("expected a cycle report");
    };
    assert!(next.launched.is_empty());
    assert_eq!(next.declined.len(), 1);
}

#[tokio::test]
async fn oversized_task_stays_pending_across_cycles() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("big", 4.0, 128.0)).unwrap();

    for round in 0..3 {
        let EventOutcome::Cycle(report) = h
            .feed(&offer_json(&format!("o{round}"), 2.0, 4096.0, 1, 100))
            .await
            .unwrap()
        else {
            panic!("expected a cycle report");
        };
        assert!(report.launched.is_empty());
        assert_eq!(report.unplaced, vec![TaskId::from("big")]);
    }
    assert_eq!(h.state("big"), TaskState::Pending);
    assert_eq!(h.transport.kinds(), vec!["DECLINE", "DECLINE", "DECLINE"]);
}

#[tokio::test]
async fn shared_offer_accept_round_trips_in_order() {
    let h = Harness::subscribed().await;
    for id in ["a", "b", "c", "d"] {
        h.scheduler.submit(TaskSpec::new(id, 0.5, 128.0)).unwrap();
    }

    h.feed(&offer_json("o1", 4.0, 4096.0, 31000, 31100)).await.unwrap();

    let calls = h.transport.wire_calls();
    let CallBody::Accept { accept } = &calls[0].body else {
        panic!("expected accept");
    };
    let offer_ids: Vec<&str> = accept.offer_ids.iter().map(|i| i.value.as_str()).collect();
    assert_eq!(offer_ids, vec!["o1"]);
    let [Operation::Launch { launch }] = &accept.operations[..] else {
        panic!("expected one launch");
    };
    let tasks: Vec<&str> = launch.task_infos.iter().map(|t| t.task_id.value.as_str()).collect();
    assert_eq!(tasks, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn unknown_task_update_changes_nothing() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap();

    let outcome = h
        .feed(&update_json("stale", "agent-x", "TASK_RUNNING", "u1"))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        EventOutcome::Update(flotilla_scheduler::UpdateOutcome::UnknownTask)
    ));
    assert_eq!(h.scheduler.registry().len(), 1);
    assert_eq!(h.state("t1"), TaskState::Pending);
}

#[tokio::test]
async fn redelivered_terminal_update_is_idempotent() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap();
    h.feed(&offer_json("o1", 2.0, 64.0, 5000, 5001)).await.unwrap();

    let finished = update_json("t1", "agent-o1", "TASK_FINISHED", "u-fin");
    h.feed(&finished).await.unwrap();
    let again = h.feed(&finished).await.unwrap();

    assert_eq!(
        again,
        EventOutcome::Update(flotilla_scheduler::UpdateOutcome::Recorded(
            Transition::Unchanged(TaskState::Finished)
        ))
    );
    assert_eq!(h.state("t1"), TaskState::Finished);
    assert_eq!(h.transport.kinds(), vec!["ACCEPT", "ACKNOWLEDGE"]);
}

#[tokio::test]
async fn kill_after_finish_is_accepted_without_call() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap();
    h.feed(&offer_json("o1", 2.0, 64.0, 5000, 5001)).await.unwrap();
    h.feed(&update_json("t1", "agent-o1", "TASK_FINISHED", "u1")).await.unwrap();
    h.transport.assert_sent_count_eq(2);

    let transition = h.scheduler.kill(&TaskId::from("t1")).await.unwrap();

    assert_eq!(transition, Transition::Unchanged(TaskState::Finished));
    assert_eq!(h.state("t1"), TaskState::Finished);
    h.transport.assert_sent_count_eq(2);
}

#[tokio::test]
async fn failed_task_is_not_resubmitted() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap();
    h.feed(&offer_json("o1", 2.0, 64.0, 5000, 5001)).await.unwrap();
    h.feed(&update_json("t1", "agent-o1", "TASK_FAILED", "u1")).await.unwrap();

    let EventOutcome::Cycle(report) = h.feed(&offer_json("o2", 2.0, 64.0, 5000, 5001)).await.unwrap()
    else {
        panic!("expected a cycle report");
    };
    assert!(report.launched.is_empty());
    assert_eq!(h.state("t1"), TaskState::Failed);

    // Retrying takes a fresh id.
    let err = h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap_err();
    assert!(matches!(err, SchedulerError::Registry(RegistryError::DuplicateTask(_))));
}

#[tokio::test]
async fn rescind_before_delivery_drops_the_offer() {
    let h = Harness::subscribed().await;
    h.scheduler.submit(TaskSpec::new("t1", 1.0, 1.0)).unwrap();

    h.feed(r#"{"type":"RESCIND","rescind":{"offer_id":{"value":"o1"}}}"#)
        .await
        .unwrap();
    let EventOutcome::Cycle(report) = h.feed(&offer_json("o1", 2.0, 64.0, 1, 2)).await.unwrap()
    else {
        panic!("expected a cycle report");
    };

    assert_eq!(report.dropped_offers.len(), 1);
    assert_eq!(h.state("t1"), TaskState::Pending);
    h.transport.assert_sent_count_eq(0);
}

#[tokio::test]
async fn concurrent_updates_and_planning_keep_one_launch_per_task() {
    let h = Harness::subscribed().await;
    for i in 0..20 {
        h.scheduler
            .submit(TaskSpec::new(format!("t{i}").as_str(), 0.1, 1.0))
            .unwrap();
    }
    h.feed(&offer_json("o1", 1.0, 10.0, 1000, 1009)).await.unwrap();
    let launched: Vec<TaskId> = h
        .scheduler
        .registry()
        .list_by_state(TaskState::Launching)
        .into_iter()
        .map(|t| t.spec.id)
        .collect();
    assert_eq!(launched.len(), 10);

    let (tx, rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = tokio::spawn(run_event_loop(h.scheduler.clone(), rx, shutdown_rx));

    let mut writers = Vec::new();
    for id in launched.clone() {
        let scheduler = h.scheduler.clone();
        writers.push(tokio::spawn(async move {
            scheduler
                .handle_event(Event::Update(flotilla_protocol::StatusUpdate {
                    task_id: id,
                    agent_id: None,
                    state: TaskState::Running,
                    uuid: None,
                    message: None,
                }))
                .await
        }));
    }
    let more = h.decoder.decode(&offer_json("o2", 1.0, 10.0, 2000, 2009)).unwrap();
    tx.send(more).await.unwrap();
    drop(tx);

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    driver.await.unwrap().unwrap();

    let registry = h.scheduler.registry();
    for id in &launched {
        assert_eq!(registry.get(id).unwrap().state, TaskState::Running);
    }
    assert_eq!(registry.list_by_state(TaskState::Pending).len(), 0);
    assert_eq!(
        registry.list_by_state(TaskState::Launching).len()
            + registry.list_by_state(TaskState::Running).len(),
        20
    );
}
