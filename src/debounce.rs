//! Event debouncing.
//!
//! Collapses bursts of container events into a single render trigger: the
//! min timer re-arms on every event, the max timer is armed once per burst,
//! and whichever fires first flushes the latest pending event.

use log::debug;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::config::Wait;
use crate::types::ContainerEvent;

/// Wraps `input` in a min/max debounce window.
///
/// With no window, or a zero minimum, the input channel is returned
/// unchanged.  Closing the input closes the output; a pending event is not
/// flushed on close.
pub fn debounce(
    input: mpsc::Receiver<ContainerEvent>,
    wait: Option<Wait>,
) -> mpsc::Receiver<ContainerEvent> {
    let Some(wait) = wait else { return input };
    if wait.min().is_zero() {
        return input;
    }

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(run(input, tx, wait));
    rx
}

async fn run(
    mut input: mpsc::Receiver<ContainerEvent>,
    output: mpsc::Sender<ContainerEvent>,
    wait: Wait,
) {
    let mut pending: Option<ContainerEvent> = None;
    let mut min_deadline: Option<Instant> = None;
    let mut max_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            event = input.recv() => {
                let Some(event) = event else { return };
                pending = Some(event);
                min_deadline = Some(Instant::now() + wait.min());
                // the max timer is sticky for the duration of a burst
                if max_deadline.is_none() {
                    max_deadline = Some(Instant::now() + wait.max());
                }
            }
            _ = sleep_until(min_deadline.unwrap_or_else(Instant::now)), if min_deadline.is_some() => {
                debug!("Debounce min timer fired");
                min_deadline = None;
                max_deadline = None;
                if let Some(event) = pending.take() {
                    if output.send(event).await.is_err() {
                        return;
                    }
                }
            }
            _ = sleep_until(max_deadline.unwrap_or_else(Instant::now)), if max_deadline.is_some() => {
                debug!("Debounce max timer fired");
                min_deadline = None;
                max_deadline = None;
                if let Some(event) = pending.take() {
                    if output.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
