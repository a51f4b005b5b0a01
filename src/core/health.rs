// SerialScribe - core/health.rs
//
// Link health classification.
//
// Two independent writers feed the health signal: the monitor thread samples
// recency on a fixed cadence, and the reader thread reports transport errors
// and successful reconnections. Both go through `HealthCell`, which only
// reports a value when it differs from the last published one, so each
// transition reaches the front-end exactly once.

use crate::core::model::HealthState;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Classify link health from recency and transport state.
///
/// A pending transport error wins over recency. Otherwise the link is stale
/// once `elapsed` reaches `stale_after`.
pub fn classify(elapsed: Duration, stale_after: Duration, link_down: bool) -> HealthState {
    if link_down {
        HealthState::Disconnected
    } else if elapsed >= stale_after {
        HealthState::Stale
    } else {
        HealthState::Connected
    }
}

/// Last published health value, shared between the capture threads.
///
/// `on_change` callbacks run while the cell is locked, so events published
/// from two threads reach the sink in the same order the cell changed.
#[derive(Debug)]
pub struct HealthCell {
    state: Mutex<HealthState>,
}

impl HealthCell {
    pub fn new(initial: HealthState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> HealthState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `next`; calls `on_change` and returns true if it differs from
    /// the previous value.
    pub fn transition(&self, next: HealthState, on_change: impl FnOnce(HealthState)) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return false;
        }
        *state = next;
        on_change(next);
        true
    }

    /// Apply a recency sample, unless the link is down.
    ///
    /// `Disconnected` is only ever cleared through `transition` after a
    /// successful reopen, never by a sample. `link_down` is evaluated under
    /// the lock so a sample racing with a transport error cannot win.
    pub fn sample(
        &self,
        elapsed: Duration,
        stale_after: Duration,
        link_down: impl FnOnce() -> bool,
        on_change: impl FnOnce(HealthState),
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == HealthState::Disconnected || link_down() {
            return false;
        }
        let next = classify(elapsed, stale_after, false);
        if *state == next {
            return false;
        }
        *state = next;
        on_change(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STALE: Duration = Duration::from_secs(60);

    #[test]
    fn test_recent_data_is_connected() {
        assert_eq!(
            classify(Duration::from_secs(59), STALE, false),
            HealthState::Connected
        );
    }

    #[test]
    fn test_threshold_reached_is_stale() {
        assert_eq!(classify(STALE, STALE, false), HealthState::Stale);
        assert_eq!(
            classify(Duration::from_secs(3_600), STALE, false),
            HealthState::Stale
        );
    }

    #[test]
    fn test_transport_error_overrides_recency() {
        assert_eq!(
            classify(Duration::ZERO, STALE, true),
            HealthState::Disconnected
        );
        assert_eq!(classify(STALE, STALE, true), HealthState::Disconnected);
    }

    #[test]
    fn test_cell_reports_only_transitions() {
        let cell = HealthCell::new(HealthState::Connected);
        let mut seen = Vec::new();
        assert!(!cell.transition(HealthState::Connected, |s| seen.push(s)));
        assert!(cell.transition(HealthState::Stale, |s| seen.push(s)));
        assert!(!cell.transition(HealthState::Stale, |s| seen.push(s)));
        assert_eq!(seen, vec![HealthState::Stale]);
        assert_eq!(cell.get(), HealthState::Stale);
    }

    #[test]
    fn test_sample_cannot_clear_disconnected() {
        let cell = HealthCell::new(HealthState::Connected);
        cell.transition(HealthState::Disconnected, |_| {});
        // Even with fresh data and no pending flag, only a reconnect clears it.
        assert!(!cell.sample(Duration::ZERO, STALE, || false, |_| {}));
        assert_eq!(cell.get(), HealthState::Disconnected);

        cell.transition(HealthState::Connected, |_| {});
        let mut seen = None;
        assert!(cell.sample(STALE, STALE, || false, |s| seen = Some(s)));
        assert_eq!(seen, Some(HealthState::Stale));
    }

    #[test]
    fn test_sample_skipped_while_link_down() {
        let cell = HealthCell::new(HealthState::Connected);
        assert!(!cell.sample(STALE, STALE, || true, |_| {}));
        assert_eq!(cell.get(), HealthState::Connected);
    }
}
