//! Background relay loop — runs a `RelayProcessor` pass on a timer.
//!
//! Each tick runs one complete pass. Shutdown is only observed between
//! passes: a triggered `ShutdownSignal` wakes the interval wait, but an
//! in-flight pass always finishes its whole batch first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::processor::RelayProcessor;

/// Default pass interval: 5 minutes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Stop request shared between the loop and its owner.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop after the current pass.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Spawn a task that runs a pass immediately and then every `interval`.
///
/// Returns the `JoinHandle` and the shutdown signal. Trigger the signal and
/// await the handle to stop once the current pass completes.
pub fn spawn_relay_loop(
    processor: Arc<RelayProcessor>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<ShutdownSignal>) {
    let shutdown = Arc::new(ShutdownSignal::new());
    let signal = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Relay loop started, passing every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // First tick completes immediately
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.notify.notified() => {}
            }

            if shutdown.is_triggered() {
                info!("Relay loop shutting down");
                return;
            }

            if let Err(e) = processor.run_pass().await {
                error!(error = %e, "Relay pass failed");
            }
        }
    });

    (handle, signal)
}
