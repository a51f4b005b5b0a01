// SerialScribe - app/monitor.rs
//
// Connection monitor: samples data recency on a fixed cadence and publishes
// `Stale` / `Connected` transitions.
//
// Runs on its own thread for the lifetime of a session and exits once the
// session's active flag clears. While a transport error is pending the
// reader thread owns the health signal and the monitor stays silent.

use crate::app::capture::SessionShared;
use crate::core::model::CaptureEvent;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Background monitor loop.
pub(crate) fn run_monitor(
    shared: Arc<SessionShared>,
    check_interval: Duration,
    stale_after: Duration,
    tx: mpsc::Sender<CaptureEvent>,
) {
    tracing::debug!(
        port = %shared.port,
        ?check_interval,
        ?stale_after,
        "Connection monitor started"
    );

    while shared.sleep_while_active(check_interval) {
        let elapsed = shared.idle_for();
        shared.health.sample(
            elapsed,
            stale_after,
            || shared.is_link_down(),
            |state| {
                tracing::info!(
                    port = %shared.port,
                    health = %state,
                    idle_secs = elapsed.as_secs(),
                    "Link health changed"
                );
                shared.emit(&tx, CaptureEvent::Health { state });
            },
        );
    }

    tracing::debug!(port = %shared.port, "Connection monitor stopped");
}
