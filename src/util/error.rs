// SerialScribe - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Every error keeps its io::Error / parser source so the full causal chain
// reaches the diagnostic log.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all SerialScribe operations.
/// Errors are categorised by the boundary that produced them.
#[derive(Debug)]
pub enum CaptureError {
    /// The serial device could not be opened or read.
    Transport(TransportError),

    /// A log file or directory operation failed.
    Persistence(PersistenceError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Persistence(e) => write!(f, "Persistence error: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Persistence(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures at the serial device boundary.
///
/// None of these are fatal to a running session: they move it into the
/// Failed / Reconnecting cycle.
#[derive(Debug)]
pub enum TransportError {
    /// The device could not be opened.
    Open { port: String, source: io::Error },

    /// Querying pending bytes or reading them failed.
    Read { port: String, source: io::Error },

    /// The handle was used after it was closed.
    Closed { port: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { port, source } => write!(f, "Cannot open '{port}': {source}"),
            Self::Read { port, source } => write!(f, "Read from '{port}' failed: {source}"),
            Self::Closed { port } => write!(f, "Device '{port}' is closed"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } | Self::Read { source, .. } => Some(source),
            Self::Closed { .. } => None,
        }
    }
}

impl From<TransportError> for CaptureError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

/// Failures at the filesystem boundary of the log store.
///
/// Surfaced to the event sink; a session keeps running after any of these.
#[derive(Debug)]
pub enum PersistenceError {
    /// The date-partitioned directory could not be created.
    CreateDir { path: PathBuf, source: io::Error },

    /// A new log file could not be created.
    CreateFile { path: PathBuf, source: io::Error },

    /// Appending a line failed.
    Write { path: PathBuf, source: io::Error },

    /// The on-disk size of the active file could not be read.
    Stat { path: PathBuf, source: io::Error },

    /// Marking a file read-only failed.
    Permissions { path: PathBuf, source: io::Error },

    /// No free file name was found in the session directory.
    NameExhausted { dir: PathBuf, stem: String },

    /// An operation needed an active file but none was created yet.
    NoActiveFile,

    /// The store was finalised; the file is read-only.
    Finalized { path: Option<PathBuf> },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { path, source } => {
                write!(f, "Cannot create log directory '{}': {source}", path.display())
            }
            Self::CreateFile { path, source } => {
                write!(f, "Cannot create log file '{}': {source}", path.display())
            }
            Self::Write { path, source } => {
                write!(f, "Write to '{}' failed: {source}", path.display())
            }
            Self::Stat { path, source } => {
                write!(f, "Cannot read size of '{}': {source}", path.display())
            }
            Self::Permissions { path, source } => write!(
                f,
                "Cannot mark '{}' read-only: {source}",
                path.display()
            ),
            Self::NameExhausted { dir, stem } => write!(
                f,
                "No free log file name for '{stem}' in '{}'",
                dir.display()
            ),
            Self::NoActiveFile => write!(f, "No active log file"),
            Self::Finalized { path: Some(path) } => {
                write!(f, "Log file '{}' is finalised (read-only)", path.display())
            }
            Self::Finalized { path: None } => write!(f, "Log store is finalised"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDir { source, .. }
            | Self::CreateFile { source, .. }
            | Self::Write { source, .. }
            | Self::Stat { source, .. }
            | Self::Permissions { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PersistenceError> for CaptureError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// JSON parsing failed (legacy `config.json`).
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::JsonParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::JsonParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for SerialScribe results.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_transport_error_keeps_source_chain() {
        let err: CaptureError = TransportError::Read {
            port: "/dev/ttyUSB0".to_string(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"),
        }
        .into();

        assert!(err.to_string().contains("/dev/ttyUSB0"));
        let transport = err.source().expect("transport layer");
        let io_err = transport.source().expect("io layer");
        assert_eq!(io_err.to_string(), "unplugged");
    }

    #[test]
    fn test_finalized_display_names_file() {
        let err = PersistenceError::Finalized {
            path: Some(PathBuf::from("logs/12_00_00.txt")),
        };
        assert!(err.to_string().contains("12_00_00.txt"));
        assert!(err.source().is_none());
    }
}
