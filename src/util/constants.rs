// SerialScribe - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Durations are expressed in the unit named by the suffix.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "SerialScribe";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "SerialScribe";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Serial device
// =============================================================================

/// Baud rate used when neither the CLI nor the config names one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout applied to the device handle (ms).
///
/// Short enough that a blocked read returns and the reader thread can observe
/// the active flag well within one second.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

/// Bounds for the user-configurable read timeout (ms).
pub const MIN_READ_TIMEOUT_MS: u64 = 10;
pub const MAX_READ_TIMEOUT_MS: u64 = 10_000;

/// How long the reader sleeps when the device reports no pending bytes (ms).
pub const DEFAULT_IDLE_POLL_MS: u64 = 20;

/// Bounds for the user-configurable idle poll (ms).
pub const MIN_IDLE_POLL_MS: u64 = 1;
pub const MAX_IDLE_POLL_MS: u64 = 1_000;

/// Maximum bytes pulled from the device in one read.
pub const MAX_READ_BYTES_PER_TICK: usize = 64 * 1_024; // 64 KiB

/// Maximum accumulated size of the partial (no newline yet) line buffer.
///
/// A device that never sends a newline would otherwise grow the buffer
/// without bound. Exceeding this discards the fragment and counts the bytes
/// as dropped.
pub const MAX_PARTIAL_LINE_BYTES: usize = 1_024 * 1_024; // 1 MiB

// =============================================================================
// Log store
// =============================================================================

/// Default rotation threshold in bytes.
pub const DEFAULT_LOG_MAX_SIZE: u64 = 1_024 * 1_024; // 1 MiB

/// Hard upper bound on the rotation threshold.
pub const ABSOLUTE_MAX_LOG_SIZE: u64 = 1_024 * 1_024 * 1_024; // 1 GiB

/// Default root directory of the date-partitioned log tree.
pub const DEFAULT_LOG_ROOT: &str = "logs";

/// Extension of every capture log file.
pub const LOG_FILE_EXTENSION: &str = "txt";

/// Upper bound on the numeric suffix tried when a log file name is taken.
pub const MAX_FILE_NAME_COLLISIONS: u32 = 1_000;

// =============================================================================
// Connection monitor
// =============================================================================

/// How often the monitor samples recency (s).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;

/// Silence after which the link is reported stale (s).
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60;

/// Bounds for both monitor settings (s).
pub const MIN_MONITOR_SECS: u64 = 1;
pub const MAX_MONITOR_SECS: u64 = 86_400;

// =============================================================================
// Reconnection
// =============================================================================

/// Wait before the first reconnection attempt (s).
pub const DEFAULT_RECONNECT_INITIAL_DELAY_SECS: u64 = 600;

/// Ceiling of the exponential backoff (s).
pub const DEFAULT_RECONNECT_MAX_DELAY_SECS: u64 = 3_600;

/// Failed attempts after which the session gives up.
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Bounds for the reconnection settings.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 86_400;
pub const MIN_RECONNECT_ATTEMPTS: u32 = 1;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 100;

// =============================================================================
// Cancellation
// =============================================================================

/// Granularity of every interruptible sleep (ms).
/// Background threads wake this often to check whether the session stopped.
pub const CANCEL_CHECK_INTERVAL_MS: u64 = 100;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a captured line included in trace output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

/// Text of the notice emitted when the device link drops.
pub const CONNECTION_LOST_NOTICE: &str = "Serial connection lost.";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
