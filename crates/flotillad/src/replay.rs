//! Replay a recorded master event stream through the scheduler.
//!
//! Input is one JSON event per line. Each outbound call is written as one
//! JSON line to the output writer, so a replay's stdout reads like the
//! request side of a real connection.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use flotilla_core::config::FlotillaConfig;
use flotilla_protocol::{Call, EventDecoder};
use flotilla_scheduler::{Scheduler, Transport, TransportError, run_event_loop};

const EVENT_BUFFER: usize = 256;

/// Writes every call as a JSON line.
pub struct LineTransport<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> Transport for LineTransport<W> {
    async fn send(&self, call: Call) -> Result<(), TransportError> {
        let line = call
            .to_json()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let mut out = self.out.lock();
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Outcome of a replay.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub events: u64,
    pub skipped_lines: u64,
    /// Task count per lifecycle state, keyed by state name.
    pub states: BTreeMap<String, usize>,
}

/// Submit the configured tasks, subscribe, then feed every event in
/// `events` to the scheduler.
pub async fn replay<R: AsyncBufRead + Unpin>(
    config: &FlotillaConfig,
    events: R,
    transport: Arc<dyn Transport>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<ReplaySummary> {
    let scheduler = Arc::new(Scheduler::new(config, transport));
    for spec in config.task_specs()? {
        scheduler.submit(spec)?;
    }
    scheduler.subscribe().await?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let driver = tokio::spawn(run_event_loop(scheduler.clone(), rx, shutdown));

    let decoder = EventDecoder::new();
    let mut skipped_lines = 0u64;
    let mut lines = events.lines();
    let mut index = 0usize;
    while let Some(line) = lines.next_line().await? {
        index += 1;
        if line.trim().is_empty() {
            continue;
        }
        match decoder.decode(&line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    // The event loop stopped; its result says why.
                    break;
                }
            }
            Err(e) => {
                warn!(line = index, error = %e, "skipping undecodable event");
                skipped_lines += 1;
            }
        }
    }
    drop(tx);

    let events = driver.await??;

    let states = scheduler
        .registry()
        .state_counts()
        .into_iter()
        .map(|(state, count)| (state.to_string(), count))
        .collect();
    let summary = ReplaySummary {
        events,
        skipped_lines,
        states,
    };
    info!(
        events = summary.events,
        skipped = summary.skipped_lines,
        states = ?summary.states,
        "replay finished"
    );
    Ok(summary)
}
