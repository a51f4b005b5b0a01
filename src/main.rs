// SerialScribe - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Config loading and logging initialisation (debug mode support)
// 3. Dispatch to the `ports` and `capture` commands
//
// The capture command is a thin front-end: it starts a session, renders
// events (captured lines on stdout, status on stderr) and stops on Ctrl-C.

use clap::{Parser, Subcommand};
use serialscribe::app::capture::{CaptureConfig, CaptureManager, CaptureRequest};
use serialscribe::core::model::{CaptureEvent, SessionSummary};
use serialscribe::platform::config::{self, PlatformPaths};
use serialscribe::platform::serial::{self, SystemSerialOpener};
use serialscribe::util;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the capture loop blocks waiting for the next event.
const EVENT_WAIT_MS: u64 = 200;

/// SerialScribe - serial port capture with rotating, date-partitioned logs.
#[derive(Parser, Debug)]
#[command(name = "serialscribe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (TOML, or legacy JSON). Defaults to the platform config dir.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports.
    Ports,

    /// Capture a serial port until Ctrl-C.
    Capture {
        /// Device to open (e.g. /dev/ttyUSB0, COM3).
        #[arg(short = 'p', long = "port")]
        port: String,

        /// Baud rate (overrides config).
        #[arg(short = 'b', long = "baud")]
        baud: Option<u32>,

        /// Root of the log tree (overrides config).
        #[arg(short = 'l', long = "log-root")]
        log_root: Option<PathBuf>,

        /// Rotation threshold in bytes (overrides config).
        #[arg(long = "max-size")]
        max_size: Option<u64>,

        /// Print every event as one JSON object per line on stdout.
        #[arg(long = "json")]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());
    let (app_config, config_warnings) = config::load_config(&config_path);

    util::logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        config = %config_path.display(),
        "SerialScribe starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let code = match cli.command {
        Command::Ports => list_ports(),
        Command::Capture {
            port,
            baud,
            log_root,
            max_size,
            json,
        } => {
            let mut capture_config = CaptureConfig::from(&app_config);
            if let Some(root) = log_root {
                capture_config.log_root = root;
            }
            if max_size.is_some() {
                let mut warnings = Vec::new();
                capture_config.log_max_size = config::bounded_log_max_size(
                    "--max-size",
                    max_size,
                    capture_config.log_max_size,
                    &mut warnings,
                );
                for warning in &warnings {
                    tracing::warn!(warning = %warning, "Argument warning");
                }
            }
            let request = CaptureRequest {
                port,
                baud_rate: baud.unwrap_or(app_config.baud_rate),
            };
            run_capture(request, capture_config, json)
        }
    };

    std::process::exit(code);
}

fn list_ports() -> i32 {
    match serial::list_ports() {
        Ok(ports) if ports.is_empty() => {
            eprintln!("No serial ports found.");
            0
        }
        Ok(ports) => {
            for port in ports {
                println!("{}\t{}", port.name, port.description);
            }
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Port enumeration failed");
            eprintln!("Error: {e}");
            1
        }
    }
}

fn run_capture(request: CaptureRequest, config: CaptureConfig, json: bool) -> i32 {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "Could not install Ctrl-C handler");
        }
    }

    let mut manager = CaptureManager::new();
    let port = request.port.clone();
    if let Err(e) = manager.start(request, Arc::new(SystemSerialOpener), config) {
        tracing::error!(port = %port, error = %e, "Capture failed to start");
        eprintln!("Error: {e}");
        return 1;
    }

    let mut exhausted = false;
    while manager.is_active() && !interrupted.load(Ordering::SeqCst) {
        if let Some(event) = manager.wait_event(Duration::from_millis(EVENT_WAIT_MS)) {
            exhausted |= matches!(event, CaptureEvent::ReconnectExhausted { .. });
            render(&event, json);
        }
    }

    let summary = manager.stop();
    for event in manager.poll_events() {
        exhausted |= matches!(event, CaptureEvent::ReconnectExhausted { .. });
        render(&event, json);
    }
    if let Some(summary) = summary {
        render_summary(&summary, json);
    }

    if exhausted {
        2
    } else {
        0
    }
}

fn render(event: &CaptureEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Could not serialise event"),
        }
        return;
    }

    match event {
        CaptureEvent::Line { text } => {
            let mut out = std::io::stdout().lock();
            if out
                .write_all(text.as_bytes())
                .and_then(|_| out.flush())
                .is_err()
            {
                tracing::debug!("Stdout closed; line not echoed");
            }
        }
        CaptureEvent::Started { port, file, .. } => {
            eprintln!("Logging started on {port}... ({})", file.display());
        }
        CaptureEvent::Health { state } => eprintln!("[status] {state} ({})", state.colour()),
        CaptureEvent::ConnectionLost { reason } => eprintln!("{reason}"),
        CaptureEvent::Reconnecting { attempt, delay_ms } => eprintln!(
            "Reconnecting (attempt {attempt}) in {:.1}s...",
            *delay_ms as f64 / 1_000.0
        ),
        CaptureEvent::Reconnected { attempt } => {
            eprintln!("Reconnected after {attempt} attempt(s).")
        }
        CaptureEvent::ReconnectExhausted { attempts } => {
            eprintln!("Giving up after {attempts} reconnection attempt(s). Logging stopped.")
        }
        CaptureEvent::FileRotated { current, .. } => {
            eprintln!("Rotated to {}", current.display())
        }
        CaptureEvent::PersistenceError { message } => eprintln!("Log write error: {message}"),
        CaptureEvent::DecodeDropped { bytes, total } => {
            tracing::debug!(bytes, total, "Undecodable bytes dropped")
        }
    }
}

fn render_summary(summary: &SessionSummary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Could not serialise summary"),
        }
        return;
    }

    eprintln!(
        "Logging stopped. {} line(s), {} byte(s) in {} file(s); {} reconnect(s).",
        summary.lines_captured,
        summary.bytes_written,
        summary.files.len(),
        summary.reconnects
    );
    if let Some(ref err) = summary.finalize_error {
        eprintln!("Warning: {err}");
    }
}
