//! Event loop feeding decoded master events into a [`Scheduler`].

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use flotilla_protocol::Event;

use crate::error::{SchedulerError, SchedulerResult};
use crate::scheduler::Scheduler;

/// Process events until the channel closes or `shutdown` turns true.
///
/// Registry and protocol errors are logged and the loop continues. A
/// transport error ends the loop and is returned, since reconnecting is
/// up to the caller.
pub async fn run_event_loop(
    scheduler: Arc<Scheduler>,
    mut events: mpsc::Receiver<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> SchedulerResult<u64> {
    let mut handled = 0u64;
    info!("event loop started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("event loop shutting down");
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("event stream closed");
                    break;
                };
                let kind = event.kind();
                handled += 1;
                match scheduler.handle_event(event).await {
                    Ok(outcome) => debug!(kind, ?outcome, "event handled"),
                    Err(SchedulerError::Transport(e)) => {
                        error!(kind, error = %e, "transport failed, stopping event loop");
                        return Err(SchedulerError::Transport(e));
                    }
                    Err(e) => error!(kind, error = %e, "event handling failed"),
                }
            }
        }
    }

    info!(handled, "event loop stopped");
    Ok(handled)
}
