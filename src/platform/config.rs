// SerialScribe - platform/config.rs
//
// Platform-specific configuration directory resolution and config file
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.
//
// The loader never fails: a missing file means defaults, and an unreadable
// file or an out-of-range value falls back to the default with a warning the
// caller can show to the operator.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for SerialScribe configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/serialscribe/ or %APPDATA%\SerialScribe\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// Config file shape
// =============================================================================

/// Raw deserialisable shape of the config file.
///
/// `log_max_size` sits at the top level so the legacy `config.json`
/// (`{"log_max_size": 1048576}`) loads unchanged. Unknown keys are ignored.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Rotation threshold in bytes.
    pub log_max_size: Option<u64>,
    /// `[storage]` section.
    pub storage: StorageSection,
    /// `[serial]` section.
    pub serial: SerialSection,
    /// `[monitor]` section.
    pub monitor: MonitorSection,
    /// `[reconnect]` section.
    pub reconnect: ReconnectSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[storage]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root of the date-partitioned log tree.
    pub log_root: Option<String>,
}

/// `[serial]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SerialSection {
    pub baud_rate: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub idle_poll_ms: Option<u64>,
}

/// `[monitor]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub check_interval_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,
}

/// `[reconnect]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub initial_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Storage --
    pub log_max_size: u64,
    pub log_root: PathBuf,

    // -- Serial --
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub idle_poll: Duration,

    // -- Monitor --
    pub check_interval: Duration,
    pub stale_after: Duration,

    // -- Reconnect --
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_attempts: u32,

    // -- Logging --
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_max_size: constants::DEFAULT_LOG_MAX_SIZE,
            log_root: PathBuf::from(constants::DEFAULT_LOG_ROOT),
            baud_rate: constants::DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(constants::DEFAULT_READ_TIMEOUT_MS),
            idle_poll: Duration::from_millis(constants::DEFAULT_IDLE_POLL_MS),
            check_interval: Duration::from_secs(constants::DEFAULT_CHECK_INTERVAL_SECS),
            stale_after: Duration::from_secs(constants::DEFAULT_STALE_AFTER_SECS),
            reconnect_initial_delay: Duration::from_secs(
                constants::DEFAULT_RECONNECT_INITIAL_DELAY_SECS,
            ),
            reconnect_max_delay: Duration::from_secs(constants::DEFAULT_RECONNECT_MAX_DELAY_SECS),
            reconnect_max_attempts: constants::DEFAULT_RECONNECT_MAX_ATTEMPTS,
            log_level: None,
        }
    }
}

// =============================================================================
// Loading and validation
// =============================================================================

/// Load and validate the config file at `path`.
///
/// `.json` files are read as JSON, everything else as TOML. Returns the
/// validated config and a list of non-fatal warnings. A missing file yields
/// defaults and no warnings.
pub fn load_config(path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let raw = match read_raw(path) {
        Ok(raw) => raw,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %path.display(), "Loaded config file");

    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
            path: path.to_path_buf(),
            source,
        })
    } else {
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Validate every field against its named bounds, accumulating warnings.
pub fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let defaults = AppConfig::default();
    let mut config = AppConfig::default();

    config.log_max_size =
        bounded_log_max_size("log_max_size", raw.log_max_size, defaults.log_max_size, warnings);

    if let Some(root) = raw.storage.log_root {
        if root.trim().is_empty() {
            warnings.push(format!(
                "[storage] log_root is empty. Using default ({}).",
                constants::DEFAULT_LOG_ROOT
            ));
        } else {
            config.log_root = PathBuf::from(root);
        }
    }

    config.baud_rate = in_range(
        "[serial] baud_rate",
        raw.serial.baud_rate,
        1..=u32::MAX,
        defaults.baud_rate,
        warnings,
    );
    config.read_timeout = Duration::from_millis(in_range(
        "[serial] read_timeout_ms",
        raw.serial.read_timeout_ms,
        constants::MIN_READ_TIMEOUT_MS..=constants::MAX_READ_TIMEOUT_MS,
        constants::DEFAULT_READ_TIMEOUT_MS,
        warnings,
    ));
    config.idle_poll = Duration::from_millis(in_range(
        "[serial] idle_poll_ms",
        raw.serial.idle_poll_ms,
        constants::MIN_IDLE_POLL_MS..=constants::MAX_IDLE_POLL_MS,
        constants::DEFAULT_IDLE_POLL_MS,
        warnings,
    ));

    config.check_interval = Duration::from_secs(in_range(
        "[monitor] check_interval_secs",
        raw.monitor.check_interval_secs,
        constants::MIN_MONITOR_SECS..=constants::MAX_MONITOR_SECS,
        constants::DEFAULT_CHECK_INTERVAL_SECS,
        warnings,
    ));
    config.stale_after = Duration::from_secs(in_range(
        "[monitor] stale_after_secs",
        raw.monitor.stale_after_secs,
        constants::MIN_MONITOR_SECS..=constants::MAX_MONITOR_SECS,
        constants::DEFAULT_STALE_AFTER_SECS,
        warnings,
    ));

    config.reconnect_initial_delay = Duration::from_secs(in_range(
        "[reconnect] initial_delay_secs",
        raw.reconnect.initial_delay_secs,
        0..=constants::MAX_RECONNECT_DELAY_SECS,
        constants::DEFAULT_RECONNECT_INITIAL_DELAY_SECS,
        warnings,
    ));
    config.reconnect_max_delay = Duration::from_secs(in_range(
        "[reconnect] max_delay_secs",
        raw.reconnect.max_delay_secs,
        0..=constants::MAX_RECONNECT_DELAY_SECS,
        constants::DEFAULT_RECONNECT_MAX_DELAY_SECS,
        warnings,
    ));
    if config.reconnect_max_delay < config.reconnect_initial_delay {
        warnings.push(format!(
            "[reconnect] max_delay_secs ({}) is below initial_delay_secs ({}). \
             Capping at initial_delay_secs.",
            config.reconnect_max_delay.as_secs(),
            config.reconnect_initial_delay.as_secs(),
        ));
        config.reconnect_max_delay = config.reconnect_initial_delay;
    }
    config.reconnect_max_attempts = in_range(
        "[reconnect] max_attempts",
        raw.reconnect.max_attempts,
        constants::MIN_RECONNECT_ATTEMPTS..=constants::MAX_RECONNECT_ATTEMPTS,
        constants::DEFAULT_RECONNECT_MAX_ATTEMPTS,
        warnings,
    );

    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    config
}

/// Apply the rotation threshold bounds to a value from `source` (a config key
/// or a command-line flag), falling back to `fallback` with a warning.
pub fn bounded_log_max_size(
    source: &str,
    value: Option<u64>,
    fallback: u64,
    warnings: &mut Vec<String>,
) -> u64 {
    in_range(
        source,
        value,
        1..=constants::ABSOLUTE_MAX_LOG_SIZE,
        fallback,
        warnings,
    )
}

/// Accept `value` if it lies in `range`, otherwise record a warning and
/// return `default`.
fn in_range<T>(
    field: &str,
    value: Option<T>,
    range: RangeInclusive<T>,
    default: T,
    warnings: &mut Vec<String>,
) -> T
where
    T: PartialOrd + Display + Copy,
{
    match value {
        None => default,
        Some(v) if range.contains(&v) => v,
        Some(v) => {
            let err = ConfigError::ValueOutOfRange {
                field: field.to_string(),
                value: v.to_string(),
                expected: format!("{}-{}", range.start(), range.end()),
            };
            warnings.push(format!("{err}. Using default ({default})."));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults_without_warnings() {
        let dir = TempDir::new().expect("tmpdir");
        let (config, warnings) = load_config(&dir.path().join("config.toml"));
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_toml_sections_are_applied() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
log_max_size = 2048

[storage]
log_root = "/var/log/serial"

[serial]
baud_rate = 9600
read_timeout_ms = 250

[monitor]
stale_after_secs = 30

[reconnect]
initial_delay_secs = 5
max_delay_secs = 60
max_attempts = 3

[logging]
level = "DEBUG"
"#,
        )
        .expect("write");

        let (config, warnings) = load_config(&path);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(config.log_max_size, 2048);
        assert_eq!(config.log_root, PathBuf::from("/var/log/serial"));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.stale_after, Duration::from_secs(30));
        assert_eq!(config.check_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect_initial_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(60));
        assert_eq!(config.reconnect_max_attempts, 3);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_legacy_json_config_loads() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"log_max_size": 4096}"#).expect("write");

        let (config, warnings) = load_config(&path);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(config.log_max_size, 4096);
    }

    #[test]
    fn test_invalid_threshold_falls_back_to_default() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_max_size = 0\n").expect("write");

        let (config, warnings) = load_config(&path);
        assert_eq!(config.log_max_size, constants::DEFAULT_LOG_MAX_SIZE);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("log_max_size"));
    }

    #[test]
    fn test_max_size_override_is_bounded() {
        let mut warnings = Vec::new();
        assert_eq!(
            bounded_log_max_size("--max-size", Some(4096), 1024, &mut warnings),
            4096
        );
        assert!(warnings.is_empty());

        let too_big = constants::ABSOLUTE_MAX_LOG_SIZE + 1;
        assert_eq!(
            bounded_log_max_size("--max-size", Some(too_big), 1024, &mut warnings),
            1024
        );
        assert_eq!(
            bounded_log_max_size("--max-size", Some(0), 1024, &mut warnings),
            1024
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("--max-size"));
    }

    #[test]
    fn test_unparseable_file_falls_back_with_warning() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_max_size = \"big\"\n").expect("write");

        let (config, warnings) = load_config(&path);
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Using defaults"));
    }

    #[test]
    fn test_max_delay_below_initial_is_capped() {
        let raw = RawConfig {
            reconnect: ReconnectSection {
                initial_delay_secs: Some(120),
                max_delay_secs: Some(10),
                max_attempts: None,
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let config = validate(raw, &mut warnings);
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(120));
        assert_eq!(warnings.len(), 1);
    }
}
