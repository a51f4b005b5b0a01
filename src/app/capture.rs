// SerialScribe - app/capture.rs
//
// Capture session lifecycle: device reading, line persistence, reconnection.
//
// Architecture:
//   - `CaptureManager` lives on the front-end thread and exposes
//     start / stop / poll.
//   - The reader thread owns the device handle, the line reassembler and the
//     log store. Reconnection backoff runs on the same thread, so reading and
//     reopening can never touch the device at the same time.
//   - The monitor thread (app::monitor) samples recency independently.
//   - Both threads share `SessionShared` and report through one
//     `mpsc::Sender<CaptureEvent>`; nothing is sent once the session is
//     inactive.
//
// State machine:
//   Idle -> Reading -> Failed -> Reconnecting -> Reading
//   any -> Idle on stop, or when every reconnection attempt failed.
//
// Cancellation:
//   - `stop` clears the active flag and joins both threads.
//   - Every sleep (idle poll, monitor cadence, reconnection backoff) is cut
//     into CANCEL_CHECK_INTERVAL_MS slices that re-check the flag, so a stop
//     during a ten-minute backoff is observed within one slice.
//   - The device read timeout bounds how long a blocked read can delay it.

use crate::app::log_store::LogStore;
use crate::app::monitor;
use crate::core::health::HealthCell;
use crate::core::model::{
    CaptureEvent, CaptureState, HealthState, SessionSnapshot, SessionSummary,
};
use crate::core::reassembler::LineReassembler;
use crate::platform::config::AppConfig;
use crate::platform::serial::{SerialDevice, SerialOpener};
use crate::util::constants::{
    CANCEL_CHECK_INTERVAL_MS, CONNECTION_LOST_NOTICE, MAX_READ_BYTES_PER_TICK,
};
use crate::util::error::{CaptureError, TransportError};
use crate::util::logging::preview;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

/// Bounded exponential backoff for reopening a failed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before the first attempt.
    pub initial_delay: Duration,
    /// Ceiling for any single wait.
    pub max_delay: Duration,
    /// Failed attempts after which the session ends.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Wait before attempt number `attempt` (1-based): the initial delay
    /// doubled per previous attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << doublings)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Everything a capture session needs besides the device identity.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub log_root: PathBuf,
    /// Rotation threshold in bytes.
    pub log_max_size: u64,
    /// Read timeout applied to the device handle.
    pub read_timeout: Duration,
    /// Sleep when no bytes are pending.
    pub idle_poll: Duration,
    pub check_interval: Duration,
    pub stale_after: Duration,
    pub reconnect: ReconnectPolicy,
}

impl From<&AppConfig> for CaptureConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            log_root: config.log_root.clone(),
            log_max_size: config.log_max_size,
            read_timeout: config.read_timeout,
            idle_poll: config.idle_poll,
            check_interval: config.check_interval,
            stale_after: config.stale_after,
            reconnect: ReconnectPolicy {
                initial_delay: config.reconnect_initial_delay,
                max_delay: config.reconnect_max_delay,
                max_attempts: config.reconnect_max_attempts,
            },
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Device to capture from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub port: String,
    pub baud_rate: u32,
}

// =============================================================================
// Shared session state
// =============================================================================

/// Session fields read across threads.
///
/// Writers: `active` by start/stop (and the reader when reconnection is
/// exhausted); `link_down`, `last_data`, `current_file` and the counters by
/// the reader only. `health` is serialised by its own lock.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) port: String,
    pub(crate) baud_rate: u32,
    active: AtomicBool,
    link_down: AtomicBool,
    last_data: Mutex<Instant>,
    current_file: Mutex<Option<PathBuf>>,
    current_file_size: AtomicU64,
    lines_captured: AtomicU64,
    dropped_bytes: AtomicU64,
    state: Mutex<CaptureState>,
    pub(crate) health: HealthCell,
}

impl SessionShared {
    fn new(request: &CaptureRequest, file: PathBuf) -> Self {
        Self {
            port: request.port.clone(),
            baud_rate: request.baud_rate,
            active: AtomicBool::new(true),
            link_down: AtomicBool::new(false),
            last_data: Mutex::new(Instant::now()),
            current_file: Mutex::new(Some(file)),
            current_file_size: AtomicU64::new(0),
            lines_captured: AtomicU64::new(0),
            dropped_bytes: AtomicU64::new(0),
            state: Mutex::new(CaptureState::Reading),
            health: HealthCell::new(HealthState::Connected),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_link_down(&self) -> bool {
        self.link_down.load(Ordering::SeqCst)
    }

    fn set_link_down(&self, down: bool) {
        self.link_down.store(down, Ordering::SeqCst);
    }

    /// Record that data just arrived.
    fn touch(&self) {
        *self.last_data.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since data last arrived.
    pub(crate) fn idle_for(&self) -> Duration {
        self.last_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn state(&self) -> CaptureState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: CaptureState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous != next {
            tracing::debug!(port = %self.port, from = ?previous, to = ?next, "Capture state");
            *state = next;
        }
    }

    fn set_current_file(&self, path: PathBuf) {
        *self
            .current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path);
        self.current_file_size.store(0, Ordering::SeqCst);
    }

    /// Sleep for `duration` in cancel-check slices.
    ///
    /// Returns `false` as soon as the session is no longer active, `true`
    /// once the full duration has passed with the session still active.
    pub(crate) fn sleep_while_active(&self, duration: Duration) -> bool {
        let slice = Duration::from_millis(CANCEL_CHECK_INTERVAL_MS);
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_active() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(slice));
        }
    }

    /// Send `event` if the session is still active.
    pub(crate) fn emit(&self, tx: &mpsc::Sender<CaptureEvent>, event: CaptureEvent) {
        if !self.is_active() {
            return;
        }
        if tx.send(event).is_err() {
            tracing::trace!(port = %self.port, "Event receiver gone; event dropped");
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            active: self.is_active(),
            state: self.state(),
            health: self.health.get(),
            idle_ms: u64::try_from(self.idle_for().as_millis()).unwrap_or(u64::MAX),
            current_file: self
                .current_file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            current_file_size: self.current_file_size.load(Ordering::SeqCst),
            lines_captured: self.lines_captured.load(Ordering::SeqCst),
            dropped_bytes: self.dropped_bytes.load(Ordering::SeqCst),
        }
    }
}

// =============================================================================
// CaptureManager
// =============================================================================

/// Manages one capture session on background threads.
///
/// Starting a new session stops the running one first, so at most one port
/// is captured per manager.
pub struct CaptureManager {
    /// Channel receiver for the front-end to poll capture events.
    /// Kept after `stop` so events sent before the stop can still be drained.
    pub event_rx: Option<mpsc::Receiver<CaptureEvent>>,
    shared: Option<Arc<SessionShared>>,
    reader: Option<JoinHandle<SessionSummary>>,
    monitor: Option<JoinHandle<()>>,
}

impl CaptureManager {
    pub fn new() -> Self {
        Self {
            event_rx: None,
            shared: None,
            reader: None,
            monitor: None,
        }
    }

    /// Open the device, create the first log file and start capturing.
    ///
    /// Returns the path of the first log file. If the device cannot be opened
    /// or the log file cannot be created, no session is started and the error
    /// is returned.
    pub fn start(
        &mut self,
        request: CaptureRequest,
        opener: Arc<dyn SerialOpener>,
        config: CaptureConfig,
    ) -> Result<PathBuf, CaptureError> {
        if let Some(summary) = self.stop() {
            tracing::info!(
                port = %summary.port,
                "Previous capture stopped before starting a new one"
            );
        }

        let mut device = opener.open(&request.port, request.baud_rate, config.read_timeout)?;

        let mut store = LogStore::new(&config.log_root, config.log_max_size);
        let file = match store.open_session().and_then(|_| store.new_file()) {
            Ok(file) => file,
            Err(e) => {
                device.close();
                return Err(e.into());
            }
        };

        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(SessionShared::new(&request, file.clone()));

        shared.emit(
            &tx,
            CaptureEvent::Started {
                port: request.port.clone(),
                baud_rate: request.baud_rate,
                file: file.clone(),
            },
        );
        shared.emit(
            &tx,
            CaptureEvent::Health {
                state: HealthState::Connected,
            },
        );

        let monitor_handle = {
            let shared = Arc::clone(&shared);
            let tx = tx.clone();
            let (interval, stale_after) = (config.check_interval, config.stale_after);
            std::thread::spawn(move || monitor::run_monitor(shared, interval, stale_after, tx))
        };

        let reader = Reader {
            shared: Arc::clone(&shared),
            opener,
            device: Some(device),
            store,
            reassembler: LineReassembler::new(),
            config,
            tx,
            reconnects: 0,
        };
        let reader_handle = std::thread::spawn(move || reader.run());

        tracing::info!(
            port = %request.port,
            baud = request.baud_rate,
            file = %file.display(),
            "Capture started"
        );

        self.event_rx = Some(rx);
        self.shared = Some(shared);
        self.reader = Some(reader_handle);
        self.monitor = Some(monitor_handle);
        Ok(file)
    }

    /// Stop the session and wait for both threads to exit.
    ///
    /// On return the device is closed, the active log file is read-only, and
    /// no further events will be sent. Returns `None` if nothing was running.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let shared = self.shared.take()?;
        shared.deactivate();

        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                tracing::error!(port = %shared.port, "Monitor thread panicked");
            }
        }

        let summary = match self.reader.take().map(JoinHandle::join) {
            Some(Ok(summary)) => summary,
            Some(Err(_)) => {
                tracing::error!(port = %shared.port, "Reader thread panicked");
                SessionSummary {
                    port: shared.port.clone(),
                    ..Default::default()
                }
            }
            None => SessionSummary {
                port: shared.port.clone(),
                ..Default::default()
            },
        };

        tracing::info!(
            port = %summary.port,
            lines = summary.lines_captured,
            files = summary.files.len(),
            reconnects = summary.reconnects,
            "Capture stopped"
        );
        Some(summary)
    }

    /// Returns `true` while a session is capturing or reconnecting.
    ///
    /// Turns `false` on its own once reconnection is exhausted; `stop` must
    /// still be called to collect the summary.
    pub fn is_active(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_active())
    }

    /// Current session state, if one was started and not yet stopped.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.as_ref().map(|s| s.snapshot())
    }

    /// Poll for pending events without blocking.
    pub fn poll_events(&self) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    /// Block up to `timeout` for the next event.
    pub fn wait_event(&self, timeout: Duration) -> Option<CaptureEvent> {
        self.event_rx.as_ref()?.recv_timeout(timeout).ok()
    }
}

impl Default for CaptureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Reader thread
// =============================================================================

struct Reader {
    shared: Arc<SessionShared>,
    opener: Arc<dyn SerialOpener>,
    device: Option<Box<dyn SerialDevice>>,
    store: LogStore,
    reassembler: LineReassembler,
    config: CaptureConfig,
    tx: mpsc::Sender<CaptureEvent>,
    reconnects: u32,
}

impl Reader {
    fn run(mut self) -> SessionSummary {
        let mut buf = vec![0u8; MAX_READ_BYTES_PER_TICK];

        while self.shared.is_active() {
            match self.poll_once(&mut buf) {
                Ok(true) => {}
                Ok(false) => {
                    self.shared.sleep_while_active(self.config.idle_poll);
                }
                Err(e) => {
                    self.on_transport_error(e);
                    if !self.reconnect() {
                        break;
                    }
                }
            }
        }

        self.shutdown()
    }

    /// Read whatever the device has pending. Returns `false` if it had nothing.
    fn poll_once(&mut self, buf: &mut [u8]) -> Result<bool, TransportError> {
        let device = self.device.as_mut().ok_or_else(|| TransportError::Closed {
            port: self.shared.port.clone(),
        })?;
        if !device.is_open() {
            return Err(TransportError::Closed {
                port: self.shared.port.clone(),
            });
        }

        let available = device.bytes_available()?;
        if available == 0 {
            return Ok(false);
        }
        let limit = available.min(buf.len());
        let n = device.read_available(&mut buf[..limit])?;
        if n == 0 {
            return Ok(false);
        }

        tracing::trace!(port = %self.shared.port, bytes = n, "Read from device");
        self.handle_bytes(&buf[..n]);
        Ok(true)
    }

    fn handle_bytes(&mut self, bytes: &[u8]) {
        let dropped_before = self.reassembler.dropped_bytes();

        let Self {
            shared,
            store,
            reassembler,
            tx,
            ..
        } = self;
        for line in reassembler.feed(bytes) {
            deliver_line(shared, store, tx, line);
        }

        let dropped_total = self.reassembler.dropped_bytes();
        if dropped_total > dropped_before {
            let bytes = dropped_total - dropped_before;
            tracing::debug!(
                port = %self.shared.port,
                bytes,
                total = dropped_total,
                "Dropped undecodable bytes"
            );
            self.shared
                .dropped_bytes
                .store(dropped_total, Ordering::SeqCst);
            self.shared.emit(
                &self.tx,
                CaptureEvent::DecodeDropped {
                    bytes,
                    total: dropped_total,
                },
            );
        }
    }

    /// Reading -> Failed. The sink hears about the loss before any
    /// reconnection attempt starts.
    fn on_transport_error(&mut self, error: TransportError) {
        tracing::warn!(port = %self.shared.port, error = %error, "Serial connection lost");

        if let Some(mut device) = self.device.take() {
            device.close();
        }

        self.shared.set_link_down(true);
        self.shared.set_state(CaptureState::Failed);
        self.shared.emit(
            &self.tx,
            CaptureEvent::ConnectionLost {
                reason: format!("{CONNECTION_LOST_NOTICE} {error}"),
            },
        );
        let (shared, tx) = (&self.shared, &self.tx);
        shared.health.transition(HealthState::Disconnected, |state| {
            shared.emit(tx, CaptureEvent::Health { state });
        });
    }

    /// Failed -> Reconnecting -> Reading.
    ///
    /// Returns `false` if the session stopped during a backoff wait or every
    /// attempt failed; in the latter case the session is ended here.
    fn reconnect(&mut self) -> bool {
        let policy = self.config.reconnect.clone();

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for(attempt);
            self.shared.set_state(CaptureState::Reconnecting);
            tracing::info!(
                port = %self.shared.port,
                attempt,
                max_attempts = policy.max_attempts,
                delay_secs = delay.as_secs_f64(),
                "Waiting before reconnection attempt"
            );
            self.shared.emit(
                &self.tx,
                CaptureEvent::Reconnecting {
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                },
            );

            if !self.shared.sleep_while_active(delay) {
                tracing::debug!(port = %self.shared.port, "Reconnection cancelled by stop");
                return false;
            }

            match self.opener.open(
                &self.shared.port,
                self.shared.baud_rate,
                self.config.read_timeout,
            ) {
                Ok(device) => {
                    self.device = Some(device);
                    self.reconnects += 1;
                    self.shared.touch();
                    self.shared.set_link_down(false);
                    self.shared.set_state(CaptureState::Reading);
                    let (shared, tx) = (&self.shared, &self.tx);
                    shared.health.transition(HealthState::Connected, |state| {
                        shared.emit(tx, CaptureEvent::Health { state });
                    });
                    self.shared
                        .emit(&self.tx, CaptureEvent::Reconnected { attempt });
                    tracing::info!(
                        port = %self.shared.port,
                        attempt,
                        "Serial connection restored"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        port = %self.shared.port,
                        attempt,
                        error = %e,
                        "Reconnection attempt failed"
                    );
                    self.shared.set_state(CaptureState::Failed);
                }
            }
        }

        tracing::error!(
            port = %self.shared.port,
            attempts = policy.max_attempts,
            "Reconnection attempts exhausted; ending capture"
        );
        self.shared.emit(
            &self.tx,
            CaptureEvent::ReconnectExhausted {
                attempts: policy.max_attempts,
            },
        );
        self.shared.deactivate();
        false
    }

    /// Any state -> Idle: release the device, keep the unfinished line, and
    /// make the active log file read-only.
    fn shutdown(mut self) -> SessionSummary {
        if let Some(mut device) = self.device.take() {
            device.close();
        }

        // Persisted without an event: the session is no longer active.
        if let Some(rest) = self.reassembler.flush() {
            if let Err(e) = self.store.append(&rest) {
                tracing::warn!(
                    port = %self.shared.port,
                    error = %e,
                    "Could not persist final partial line"
                );
            }
        }

        let finalize_error = match self.store.finalize() {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    port = %self.shared.port,
                    error = %e,
                    "Could not mark log file read-only"
                );
                Some(e.to_string())
            }
        };

        self.shared.set_state(CaptureState::Idle);

        SessionSummary {
            port: self.shared.port.clone(),
            lines_captured: self.shared.lines_captured.load(Ordering::SeqCst),
            bytes_written: self.store.bytes_written(),
            files: self.store.files().to_vec(),
            reconnects: self.reconnects,
            dropped_bytes: self.reassembler.dropped_bytes(),
            finalize_error,
        }
    }
}

/// Persist one line, publish it, then rotate if the file is full.
///
/// Persistence failures are reported and the line is still published: a
/// dropped line on disk is preferable to a dead session.
fn deliver_line(
    shared: &SessionShared,
    store: &mut LogStore,
    tx: &mpsc::Sender<CaptureEvent>,
    line: String,
) {
    shared.touch();

    match store.append(&line) {
        Ok(()) => {
            shared
                .current_file_size
                .store(store.tracked_size(), Ordering::SeqCst);
        }
        Err(e) => {
            tracing::warn!(port = %shared.port, error = %e, "Failed to persist line");
            shared.emit(
                tx,
                CaptureEvent::PersistenceError {
                    message: e.to_string(),
                },
            );
        }
    }

    shared.lines_captured.fetch_add(1, Ordering::SeqCst);
    tracing::trace!(port = %shared.port, line = preview(line.trim_end()), "Captured line");
    shared.emit(tx, CaptureEvent::Line { text: line });

    let previous = store.active_file().map(PathBuf::from);
    match store.rotate_if_needed() {
        Ok(Some(current)) => {
            shared.set_current_file(current.clone());
            if let Some(previous) = previous {
                shared.emit(tx, CaptureEvent::FileRotated { previous, current });
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(port = %shared.port, error = %e, "Log rotation check failed");
            shared.emit(
                tx,
                CaptureEvent::PersistenceError {
                    message: e.to_string(),
                },
            );
        }
    }
}
