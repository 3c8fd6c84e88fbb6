//! Replay frame source - plays back a recorded capture session
//!
//! Recordings are JSON lines, one `TransportEvent` per line:
//!
//! ```text
//! {"topology":[{"name":"Actor","segments":[...]}]}
//! {"frame":{"frame_number":1,"timestamp":0.01,"subjects":[...]}}
//! ```
//!
//! Frames are delivered at their recorded cadence divided by `speed`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{ContractError, EventCallback, FrameSource, RawFrame, TransportEvent};
use tracing::{debug, info, warn};

/// Fallback spacing between loops when a recording has a single frame
const DEFAULT_FRAME_PERIOD_S: f64 = 0.01;

/// Replay configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback speed multiplier (1.0 = recorded speed)
    pub speed: f64,

    /// Restart from the beginning when the recording ends
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_playback: false,
        }
    }
}

/// Replay frame source
pub struct ReplayFrameSource {
    events: Arc<Vec<TransportEvent>>,
    config: ReplayConfig,
    connected: bool,
    streaming: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

impl ReplayFrameSource {
    /// Load a JSON-lines recording
    pub fn load(path: &Path, config: ReplayConfig) -> Result<Self, ContractError> {
        let reader = BufReader::new(File::open(path)?);
        let mut events = Vec::new();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: TransportEvent = serde_json::from_str(&line).map_err(|e| {
                ContractError::transport(format!(
                    "{}:{}: invalid recording line: {e}",
                    path.display(),
                    number + 1
                ))
            })?;
            events.push(event);
        }

        let mut source = Self::from_events(events, config)?;
        source.label = path.display().to_string();
        info!(
            path = %path.display(),
            events = source.events.len(),
            "loaded recording"
        );
        Ok(source)
    }

    /// Build from in-memory events
    pub fn from_events(
        events: Vec<TransportEvent>,
        config: ReplayConfig,
    ) -> Result<Self, ContractError> {
        match events.first() {
            Some(TransportEvent::Topology(_)) => {}
            _ => {
                return Err(ContractError::transport(
                    "recording must start with a topology record",
                ))
            }
        }
        if !(config.speed.is_finite() && config.speed > 0.0) {
            return Err(ContractError::transport(format!(
                "replay speed must be > 0, got {}",
                config.speed
            )));
        }

        Ok(Self {
            events: Arc::new(events),
            config,
            connected: false,
            streaming: Arc::new(AtomicBool::new(false)),
            handle: None,
            label: "memory".to_string(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Frame(_)))
            .count()
    }

    /// Recorded duration between first and last frame (seconds)
    pub fn duration(&self) -> f64 {
        let (first, last) = frame_span(&self.events);
        match (first, last) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        }
    }

    fn run(
        events: Arc<Vec<TransportEvent>>,
        config: ReplayConfig,
        streaming: Arc<AtomicBool>,
        callback: EventCallback,
    ) {
        let (first, last) = frame_span(&events);
        let Some(first_timestamp) = first else {
            warn!("recording has no frames");
            streaming.store(false, Ordering::SeqCst);
            return;
        };
        let span = last.unwrap_or(first_timestamp) - first_timestamp;
        let loop_length = span + last_frame_period(&events).unwrap_or(DEFAULT_FRAME_PERIOD_S);

        let start = Instant::now();
        let mut iteration: u64 = 0;
        loop {
            // Timestamps keep increasing across loops
            let rebase = iteration as f64 * loop_length;
            for event in events.iter() {
                if !streaming.load(Ordering::Relaxed) {
                    debug!("replay stopped");
                    return;
                }
                match event {
                    TransportEvent::Frame(frame) => {
                        let offset = frame.timestamp - first_timestamp + rebase;
                        let target = Duration::from_secs_f64((offset / config.speed).max(0.0));
                        let elapsed = start.elapsed();
                        if target > elapsed {
                            thread::sleep(target - elapsed);
                        }
                        let mut frame = frame.clone();
                        frame.timestamp += rebase;
                        callback(TransportEvent::Frame(frame));
                    }
                    // leading topology is announced once
                    TransportEvent::Topology(_) if iteration > 0 && is_leading(&events, event) => {}
                    other => callback(other.clone()),
                }
            }

            if !config.loop_playback {
                info!("replay completed");
                break;
            }
            iteration += 1;
            debug!(iteration, "looping replay");
        }

        streaming.store(false, Ordering::SeqCst);
    }
}

fn is_leading(events: &[TransportEvent], event: &TransportEvent) -> bool {
    events
        .first()
        .is_some_and(|first| std::ptr::eq(first, event))
}

fn frames(events: &[TransportEvent]) -> impl Iterator<Item = &RawFrame> {
    events.iter().filter_map(|e| match e {
        TransportEvent::Frame(frame) => Some(frame),
        _ => None,
    })
}

fn frame_span(events: &[TransportEvent]) -> (Option<f64>, Option<f64>) {
    let first = frames(events).next().map(|f| f.timestamp);
    let last = frames(events).last().map(|f| f.timestamp);
    (first, last)
}

fn last_frame_period(events: &[TransportEvent]) -> Option<f64> {
    let timestamps: Vec<f64> = frames(events).map(|f| f.timestamp).collect();
    match timestamps.as_slice() {
        [.., a, b] if b > a => Some(b - a),
        _ => None,
    }
}

/// Write events as a JSON-lines recording
pub fn write_recording(path: &Path, events: &[TransportEvent]) -> Result<(), ContractError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|e| ContractError::transport(format!("failed to encode event: {e}")))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

impl FrameSource for ReplayFrameSource {
    fn describe(&self) -> String {
        format!("replay({}, x{})", self.label, self.config.speed)
    }

    fn connect(&mut self, host: &str) -> Result<(), ContractError> {
        debug!(host, recording = %self.label, "replay source ignores host");
        self.connected = true;
        Ok(())
    }

    fn start(&mut self, callback: EventCallback) -> Result<(), ContractError> {
        if !self.connected {
            return Err(ContractError::transport("replay started before connect"));
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let events = self.events.clone();
        let config = self.config.clone();
        let streaming = self.streaming.clone();
        let handle = thread::Builder::new()
            .name("replay-frame-source".into())
            .spawn(move || Self::run(events, config, streaming, callback))
            .map_err(|e| {
                self.streaming.store(false, Ordering::SeqCst);
                ContractError::transport(format!("failed to spawn replay thread: {e}"))
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }
}

impl Drop for ReplayFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
