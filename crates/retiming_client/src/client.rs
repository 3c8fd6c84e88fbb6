//! RetimingClient - connection state machine and snapshot publication
//!
//! The frame source delivers events on its own thread into the inbox. An
//! update cycle (caller-driven, or the streaming thread started by
//! `connect_and_start`) drains the inbox into the engine and publishes a
//! new `Snapshot`. Queries read the published snapshot and never block the
//! writer for longer than an `Arc` clone.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    AxisDirection, AxisMapping, ClientConfig, CycleReport, EventCallback, FrameSource, Name,
    Snapshot, TransportEvent,
};
use retiming_engine::{EngineSettings, EngineStats, RetimingEngine};
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{Result, RetimingError};
use crate::inbox::{Inbox, InboxStats};
use crate::timing_log::{FrameTiming, TimingLogs};

/// Library version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub point: u32,
}

const fn parse_u32(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

pub const VERSION: Version = Version {
    major: parse_u32(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_u32(env!("CARGO_PKG_VERSION_MINOR")),
    point: parse_u32(env!("CARGO_PKG_VERSION_PATCH")),
};

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.point)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connected; the caller drives update cycles
    Connected,
    /// Connected; the streaming thread drives update cycles
    Streaming,
}

/// Client diagnostics
#[derive(Debug, Clone, Copy)]
pub struct ClientStats {
    pub state: ConnectionState,
    pub generation: u64,
    pub engine: EngineStats,
    pub inbox: InboxStats,
}

/// State guarded by the publication lock
struct Publication {
    connection: ConnectionState,
    snapshot: Option<Arc<Snapshot>>,
    report: Option<CycleReport>,
    /// Bumped on every publish
    generation: u64,
    /// Raw frames received since connect
    arrivals: u64,
    last_arrival: Option<Instant>,
    /// Fatal source failure not yet reported to the caller
    failure: Option<String>,
}

struct Shared {
    publication: Mutex<Publication>,
    signal: Condvar,
    engine: Mutex<RetimingEngine>,
    settings: RwLock<EngineSettings>,
    inbox: Inbox,
    timing: TimingLogs,
    timeout_ms: AtomicU64,
    stop_streaming: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn publication(&self) -> MutexGuard<'_, Publication> {
        lock(&self.publication)
    }

    fn settings(&self) -> EngineSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update_settings(&self, f: impl FnOnce(&mut EngineSettings)) {
        let mut settings = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut settings);
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Source thread entry point
    fn on_event(&self, event: TransportEvent) {
        let mut publication = self.publication();
        if publication.connection == ConnectionState::Disconnected {
            trace!("event after disconnect ignored");
            return;
        }
        match event {
            TransportEvent::Frame(frame) => {
                let timing = FrameTiming::of(&frame);
                self.inbox.push(TransportEvent::Frame(frame));
                publication.arrivals += 1;
                publication.last_arrival = Some(Instant::now());
                drop(publication);
                self.signal.notify_all();

                observability::record_frame_ingested(timing.segments());
                self.timing.record_frame(timing);
                return;
            }
            TransportEvent::Topology(subjects) => {
                debug!(subjects = subjects.len(), "topology received");
                self.inbox.push(TransportEvent::Topology(subjects));
            }
            TransportEvent::Disconnected { reason } => {
                warn!(reason = %reason, "frame source failed");
                metrics::counter!("retiming_transport_failures_total").increment(1);
                publication.connection = ConnectionState::Disconnected;
                publication.snapshot = None;
                publication.failure = Some(reason);
            }
        }
        self.signal.notify_all();
    }

    /// Drain the inbox, run one engine cycle and publish the result.
    fn run_cycle(&self, offset: f64) -> Result<Arc<Snapshot>> {
        let settings = self.settings();
        let mut engine = lock(&self.engine);

        for event in self.inbox.drain() {
            match event {
                TransportEvent::Topology(subjects) => {
                    engine.apply_topology(&subjects);
                }
                TransportEvent::Frame(frame) => {
                    let ingest = engine.ingest_frame(&frame, settings.lightweight);
                    if ingest.rejected > 0 {
                        observability::record_sample_rejected("out_of_order", ingest.rejected as u64);
                    }
                    if ingest.unknown > 0 {
                        observability::record_sample_rejected("unknown_segment", ingest.unknown as u64);
                    }
                }
                TransportEvent::Disconnected { .. } => {}
            }
        }

        let (snapshot, report) = engine.update(&settings, offset)?;
        let snapshot = Arc::new(snapshot);

        // publish while still holding the engine so generations follow t_query order
        let mut publication = self.publication();
        if publication.connection == ConnectionState::Disconnected {
            return Err(RetimingError::NotConnected);
        }
        publication.snapshot = Some(snapshot.clone());
        publication.generation += 1;
        publication.report = Some(report.clone());
        drop(publication);
        self.signal.notify_all();

        self.timing.record_cycle(&report);
        observability::record_cycle_metrics(&report);

        Ok(snapshot)
    }

    /// Offset for a streaming tick: local time since the newest frame arrived
    fn streaming_offset(&self, maximum_prediction_s: f64) -> f64 {
        self.publication()
            .last_arrival
            .map(|at| at.elapsed().as_secs_f64().min(maximum_prediction_s))
            .unwrap_or(0.0)
    }
}

/// Report a pending failure once, then the connection state.
fn check_active(publication: &mut Publication) -> Result<()> {
    if let Some(reason) = publication.failure.take() {
        return Err(RetimingError::TransportFailure { reason });
    }
    match publication.connection {
        ConnectionState::Disconnected => Err(RetimingError::NotConnected),
        _ => Ok(()),
    }
}

fn streaming_loop(shared: Arc<Shared>, period: Duration) {
    info!(period_ms = period.as_secs_f64() * 1000.0, "streaming loop started");
    let mut next_tick = Instant::now();

    while !shared.stop_streaming.load(Ordering::Relaxed) {
        let maximum_prediction_s = shared.settings().maximum_prediction_s;
        let offset = shared.streaming_offset(maximum_prediction_s);
        match shared.run_cycle(offset) {
            Ok(_) | Err(RetimingError::NoNewFrame) => {}
            Err(RetimingError::NotConnected) => break,
            Err(error) => warn!(error = %error, "streaming cycle failed"),
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now;
            continue;
        }
        let publication = shared.publication();
        let (publication, _) = shared
            .signal
            .wait_timeout_while(publication, next_tick - now, |p| {
                p.connection == ConnectionState::Streaming
                    && !shared.stop_streaming.load(Ordering::Relaxed)
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if publication.connection != ConnectionState::Streaming {
            break;
        }
    }
    debug!("streaming loop stopped");
}

/// Retiming client
///
/// One instance per connection. All methods take `&self`; share it behind an
/// `Arc` to call `disconnect` while another thread waits in `wait_for_frame`.
///
/// # Example
///
/// ```ignore
/// let client = RetimingClient::new(Box::new(source), ClientConfig::default())?;
/// client.connect("localhost:801")?;
/// loop {
///     client.wait_for_frame()?;
///     let t = client.segment_global_translation("Actor", "Hips")?;
/// }
/// ```
pub struct RetimingClient {
    shared: Arc<Shared>,
    source: Mutex<Box<dyn FrameSource>>,
    streamer: Mutex<Option<JoinHandle<()>>>,
}

impl RetimingClient {
    /// Create a disconnected client
    pub fn new(source: Box<dyn FrameSource>, config: ClientConfig) -> Result<Self> {
        config.axis_mapping.validate()?;
        check_duration("maximum_prediction", config.maximum_prediction_s)?;
        if !config.output_latency_s.is_finite() {
            return Err(RetimingError::invalid_argument(
                "output_latency",
                "must be finite",
            ));
        }
        if config.connection_timeout_ms == 0 {
            return Err(RetimingError::invalid_argument(
                "connection_timeout",
                "must be at least 1 ms",
            ));
        }

        let timing = TimingLogs::default();
        let log_path = |p: &Option<std::path::PathBuf>| p.clone().unwrap_or_default();
        if config.timing_log.client_log.is_some() || config.timing_log.stream_log.is_some() {
            timing.open(
                &log_path(&config.timing_log.client_log),
                &log_path(&config.timing_log.stream_log),
            )?;
        }

        let shared = Shared {
            publication: Mutex::new(Publication {
                connection: ConnectionState::Disconnected,
                snapshot: None,
                report: None,
                generation: 0,
                arrivals: 0,
                last_arrival: None,
                failure: None,
            }),
            signal: Condvar::new(),
            engine: Mutex::new(RetimingEngine::new(&config)),
            settings: RwLock::new(EngineSettings::from_config(&config)),
            inbox: Inbox::new(&config.inbox),
            timing,
            timeout_ms: AtomicU64::new(config.connection_timeout_ms),
            stop_streaming: AtomicBool::new(false),
        };

        Ok(Self {
            shared: Arc::new(shared),
            source: Mutex::new(source),
            streamer: Mutex::new(None),
        })
    }

    pub fn version() -> Version {
        VERSION
    }

    // ===== Connection =====

    /// Connect to `host`; update cycles are driven by the caller.
    #[instrument(name = "retiming_connect", skip(self))]
    pub fn connect(&self, host: &str) -> Result<()> {
        if self.is_connected() {
            debug!("already connected, reconnecting");
        }
        self.shutdown();

        let mut source = lock(&self.source);
        let lightweight = self.shared.settings().lightweight;
        source.set_lightweight(lightweight);
        source.connect(host).map_err(|error| {
            warn!(host, error = %error, "connection failed");
            RetimingError::ConnectionFailed(error)
        })?;

        {
            let mut engine = lock(&self.shared.engine);
            engine.reset();
            self.shared.inbox.clear();

            let mut publication = self.shared.publication();
            publication.connection = ConnectionState::Connected;
            publication.snapshot = None;
            publication.report = None;
            publication.arrivals = 0;
            publication.last_arrival = None;
            publication.failure = None;
        }

        let shared = self.shared.clone();
        let callback: EventCallback = Arc::new(move |event| shared.on_event(event));
        if let Err(error) = source.start(callback) {
            self.shared.publication().connection = ConnectionState::Disconnected;
            source.stop();
            return Err(RetimingError::ConnectionFailed(error));
        }

        info!(host, source = %source.describe(), "connected");
        metrics::counter!("retiming_connections_total").increment(1);
        Ok(())
    }

    /// Connect and run update cycles internally at `frame_rate` Hz.
    #[instrument(name = "retiming_connect_and_start", skip(self))]
    pub fn connect_and_start(&self, host: &str, frame_rate: f64) -> Result<()> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(RetimingError::invalid_argument(
                "frame_rate",
                format!("must be > 0, got {frame_rate}"),
            ));
        }
        self.connect(host)?;

        self.shared.stop_streaming.store(false, Ordering::SeqCst);
        {
            let mut publication = self.shared.publication();
            check_active(&mut publication)?;
            publication.connection = ConnectionState::Streaming;
        }

        let shared = self.shared.clone();
        let period = Duration::from_secs_f64(1.0 / frame_rate);
        let handle = thread::Builder::new()
            .name("retiming-stream".into())
            .spawn(move || streaming_loop(shared, period))
            .map_err(|e| {
                self.shutdown();
                RetimingError::Io(e)
            })?;
        *lock(&self.streamer) = Some(handle);
        Ok(())
    }

    /// Disconnect and wake every thread blocked in `wait_for_frame`.
    #[instrument(name = "retiming_disconnect", skip(self))]
    pub fn disconnect(&self) -> Result<()> {
        let was_connected = {
            let mut publication = self.shared.publication();
            publication.failure.take().is_some()
                || publication.connection != ConnectionState::Disconnected
        };
        self.shutdown();
        if !was_connected {
            return Err(RetimingError::NotConnected);
        }
        info!("disconnected");
        Ok(())
    }

    fn shutdown(&self) {
        {
            let mut publication = self.shared.publication();
            publication.connection = ConnectionState::Disconnected;
            publication.snapshot = None;
        }
        self.shared.stop_streaming.store(true, Ordering::SeqCst);
        self.shared.signal.notify_all();

        if let Some(handle) = lock(&self.streamer).take() {
            if handle.join().is_err() {
                warn!("streaming thread panicked");
            }
        }
        lock(&self.source).stop();
        self.shared.inbox.clear();
        lock(&self.shared.engine).reset();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.publication().connection != ConnectionState::Disconnected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.publication().connection
    }

    // ===== Mode flags =====

    pub fn enable_lightweight_segment_data(&self) {
        self.set_lightweight(true);
    }

    pub fn disable_lightweight_segment_data(&self) {
        self.set_lightweight(false);
    }

    fn set_lightweight(&self, enabled: bool) {
        self.shared.update_settings(|s| s.lightweight = enabled);
        lock(&self.source).set_lightweight(enabled);
        debug!(enabled, "lightweight segment data");
    }

    pub fn is_lightweight_segment_data_enabled(&self) -> bool {
        self.shared.settings().lightweight
    }

    // ===== Axis mapping =====

    pub fn set_axis_mapping(&self, x: AxisDirection, y: AxisDirection, z: AxisDirection) -> Result<()> {
        let mapping = AxisMapping::new(x, y, z)?;
        self.shared.update_settings(|s| s.axis_mapping = mapping);
        Ok(())
    }

    pub fn axis_mapping(&self) -> AxisMapping {
        self.shared.settings().axis_mapping
    }

    // ===== Cadence =====

    /// Run one caller-driven update cycle.
    pub fn update_frame(&self) -> Result<()> {
        self.update_frame_offset(0.0)
    }

    /// Run one caller-driven update cycle at `T_latest - OutputLatency + offset`.
    pub fn update_frame_offset(&self, offset: f64) -> Result<()> {
        if !offset.is_finite() {
            return Err(RetimingError::invalid_argument("offset", "must be finite"));
        }
        {
            let mut publication = self.shared.publication();
            check_active(&mut publication)?;
            if publication.connection == ConnectionState::Streaming {
                return Err(RetimingError::StreamingActive);
            }
        }
        self.shared.run_cycle(offset).map(|_| ())
    }

    /// Block until a new snapshot is published.
    ///
    /// Returns `Timeout` after the connection timeout, `NotConnected` when
    /// the client is disconnected meanwhile, or `TransportFailure` when the
    /// source fails.
    #[instrument(name = "retiming_wait_for_frame", level = "trace", skip(self))]
    pub fn wait_for_frame(&self) -> Result<()> {
        let timeout = self.shared.timeout();
        let deadline = Instant::now() + timeout;
        let timed_out = || RetimingError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        };

        let mut publication = self.shared.publication();
        check_active(&mut publication)?;

        if publication.connection == ConnectionState::Streaming {
            let seen = publication.generation;
            loop {
                check_active(&mut publication)?;
                if publication.generation > seen {
                    return Ok(());
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(timed_out());
                }
                publication = self
                    .shared
                    .signal
                    .wait_timeout(publication, deadline - now)
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0;
            }
        }

        // caller-driven: run cycles as raw frames arrive
        loop {
            let seen_arrivals = publication.arrivals;
            drop(publication);

            match self.shared.run_cycle(0.0) {
                Ok(_) => return Ok(()),
                Err(RetimingError::NoNewFrame) => {}
                Err(error) => return Err(error),
            }

            publication = self.shared.publication();
            loop {
                check_active(&mut publication)?;
                if publication.connection == ConnectionState::Streaming {
                    return Err(RetimingError::StreamingActive);
                }
                if publication.arrivals != seen_arrivals {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(timed_out());
                }
                publication = self
                    .shared
                    .signal
                    .wait_timeout(publication, deadline - now)
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0;
            }
        }
    }

    /// Current snapshot; reports a pending transport failure once.
    pub fn latest_snapshot(&self) -> Result<Arc<Snapshot>> {
        let mut publication = self.shared.publication();
        check_active(&mut publication)?;
        publication.snapshot.clone().ok_or(RetimingError::NoNewFrame)
    }

    /// Statistics of the most recent cycle
    pub fn last_cycle_report(&self) -> Option<CycleReport> {
        self.shared.publication().report.clone()
    }

    /// Publication counter of the current snapshot
    pub fn frame_number(&self) -> Result<u64> {
        self.latest_snapshot().map(|snapshot| snapshot.frame_number)
    }

    // ===== Tuning =====

    pub fn set_output_latency(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() {
            return Err(RetimingError::invalid_argument(
                "output_latency",
                "must be finite",
            ));
        }
        self.shared.update_settings(|s| s.output_latency_s = seconds);
        Ok(())
    }

    pub fn output_latency(&self) -> f64 {
        self.shared.settings().output_latency_s
    }

    pub fn set_maximum_prediction(&self, seconds: f64) -> Result<()> {
        check_duration("maximum_prediction", seconds)?;
        self.shared.update_settings(|s| s.maximum_prediction_s = seconds);
        Ok(())
    }

    pub fn maximum_prediction(&self) -> f64 {
        self.shared.settings().maximum_prediction_s
    }

    // ===== Filtering =====

    pub fn clear_subject_filter(&self) {
        self.shared.update_settings(|s| s.subject_filter.clear());
    }

    pub fn add_to_subject_filter(&self, subject: &str) -> Result<()> {
        if subject.is_empty() {
            return Err(RetimingError::invalid_argument(
                "subject",
                "must not be empty",
            ));
        }
        self.shared.update_settings(|s| {
            if !s.subject_filter.iter().any(|name| name == subject) {
                s.subject_filter.push(Name::from(subject));
            }
        });
        Ok(())
    }

    // ===== Diagnostics =====

    /// Open JSON-lines timing logs; an empty path disables that log.
    pub fn set_timing_log_file(&self, client_log: &Path, stream_log: &Path) -> Result<()> {
        self.shared.timing.open(client_log, stream_log)
    }

    pub fn set_connection_timeout(&self, timeout_ms: u64) -> Result<()> {
        if timeout_ms == 0 {
            return Err(RetimingError::invalid_argument(
                "connection_timeout",
                "must be at least 1 ms",
            ));
        }
        self.shared.timeout_ms.store(timeout_ms, Ordering::Relaxed);
        Ok(())
    }

    pub fn connection_timeout_ms(&self) -> u64 {
        self.shared.timeout_ms.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ClientStats {
        let engine = lock(&self.shared.engine).stats();
        let publication = self.shared.publication();
        ClientStats {
            state: publication.connection,
            generation: publication.generation,
            engine,
            inbox: self.shared.inbox.stats(),
        }
    }

    pub fn source_description(&self) -> String {
        lock(&self.source).describe()
    }
}

impl Drop for RetimingClient {
    fn drop(&mut self) {
        self.shutdown();
        self.shared.timing.close();
    }
}

fn check_duration(name: &'static str, seconds: f64) -> Result<()> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        Err(RetimingError::invalid_argument(
            name,
            format!("must be a finite value >= 0, got {seconds}"),
        ))
    }
}
