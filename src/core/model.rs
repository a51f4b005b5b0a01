// SerialScribe - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// These types are the shared vocabulary between the capture threads and
// whatever front-end consumes their events.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Health
// =============================================================================

/// Link health as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Data has arrived within the staleness window.
    Connected,
    /// The device is open but silent for at least the staleness window.
    Stale,
    /// A transport error is pending; overrides the other two until a
    /// reconnection succeeds.
    Disconnected,
}

impl HealthState {
    /// Traffic-light colour used by status displays.
    pub fn colour(self) -> &'static str {
        match self {
            Self::Connected => "green",
            Self::Stale => "yellow",
            Self::Disconnected => "red",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connected => "connected",
            Self::Stale => "stale",
            Self::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Capture state machine
// =============================================================================

/// Lifecycle of a capture session.
///
/// `Idle -> Reading -> Failed -> Reconnecting -> Reading`, and any state
/// returns to `Idle` on stop or when reconnection is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Reading,
    Failed,
    Reconnecting,
}

// =============================================================================
// Capture events (sink boundary)
// =============================================================================

/// Events sent from the capture threads to the front-end.
///
/// The front-end owns all rendering; the core never touches display state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// The session is open and writing to `file`.
    Started {
        port: String,
        baud_rate: u32,
        file: PathBuf,
    },

    /// One captured line, trimmed and newline-terminated.
    Line { text: String },

    /// Link health changed.
    Health { state: HealthState },

    /// The device failed; reading has stopped until a reconnection succeeds.
    ConnectionLost { reason: String },

    /// A reconnection attempt will be made after `delay_ms`.
    Reconnecting { attempt: u32, delay_ms: u64 },

    /// The device was reopened; capture resumes into the same file.
    Reconnected { attempt: u32 },

    /// Every reconnection attempt failed; the session has ended.
    ReconnectExhausted { attempts: u32 },

    /// The active file reached the size threshold and a new one was opened.
    FileRotated { previous: PathBuf, current: PathBuf },

    /// A filesystem operation failed; the affected line was not persisted.
    PersistenceError { message: String },

    /// Undecodable bytes were discarded from the stream.
    DecodeDropped { bytes: u64, total: u64 },
}

// =============================================================================
// Session snapshot and summary
// =============================================================================

/// Point-in-time view of a running session for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Device identifier (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port: String,
    pub baud_rate: u32,
    /// Whether the session is still active.
    pub active: bool,
    pub state: CaptureState,
    pub health: HealthState,
    /// Milliseconds since the last byte arrived.
    pub idle_ms: u64,
    pub current_file: Option<PathBuf>,
    /// Bytes appended to `current_file` by this session.
    pub current_file_size: u64,
    pub lines_captured: u64,
    pub dropped_bytes: u64,
}

/// Final accounting returned when a session is stopped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub port: String,
    pub lines_captured: u64,
    pub bytes_written: u64,
    /// Every file this session created, in creation order.
    pub files: Vec<PathBuf>,
    pub reconnects: u32,
    pub dropped_bytes: u64,
    /// Set when the read-only marking of the last file failed.
    pub finalize_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_colours_match_status_dot() {
        assert_eq!(HealthState::Connected.colour(), "green");
        assert_eq!(HealthState::Stale.colour(), "yellow");
        assert_eq!(HealthState::Disconnected.colour(), "red");
    }

    #[test]
    fn test_event_serialises_with_tag() {
        let json = serde_json::to_string(&CaptureEvent::Health {
            state: HealthState::Stale,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"health","state":"stale"}"#);
    }
}
