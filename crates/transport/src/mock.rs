//! Mock frame source
//!
//! Implements `FrameSource`, generating procedurally animated subjects.
//! Used for testing and development without a capture server.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    ContractError, EventCallback, FrameSource, RawFrame, SegmentDescription, SegmentFrame,
    SubjectDescription, SubjectFrame, Transform, TransportEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

/// Length of every generated bone (mm)
const BONE_LENGTH_MM: f64 = 250.0;
/// Radius of the root's circular path (mm)
const PATH_RADIUS_MM: f64 = 1500.0;

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// Capture rate (Hz)
    pub frame_rate_hz: f64,
    /// Number of generated subjects
    pub subjects: usize,
    /// Segments per subject, root included
    pub segments_per_subject: usize,
    /// Uniform capture-timestamp jitter (seconds, ± this value)
    pub timestamp_jitter_s: f64,
    /// Chance that a non-root segment is reported occluded
    pub occlusion_probability: f64,
    /// RNG seed; equal seeds give equal streams
    pub seed: u64,
    /// Hosts that refuse connections
    pub unreachable_hosts: Vec<String>,
    /// Emit a fatal disconnect after this many frames
    pub fail_after_frames: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 100.0,
            subjects: 1,
            segments_per_subject: 5,
            timestamp_jitter_s: 0.001,
            occlusion_probability: 0.0,
            seed: 7,
            unreachable_hosts: Vec::new(),
            fail_after_frames: None,
        }
    }
}

/// Mock frame source
///
/// Generates frames on a background thread at the configured rate and sends
/// them through the callback, like a live capture server would.
pub struct MockFrameSource {
    config: MockSourceConfig,
    host: Option<String>,
    streaming: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockFrameSource {
    pub fn new(config: MockSourceConfig) -> Self {
        Self {
            config,
            host: None,
            streaming: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MockSourceConfig::default())
    }

    pub fn subject_name(index: usize) -> String {
        format!("Subject{}", index + 1)
    }

    pub fn segment_name(index: usize) -> String {
        if index == 0 {
            "Root".to_string()
        } else {
            format!("Segment{index}")
        }
    }

    /// Subjects as announced to the client: one chain per subject.
    pub fn topology(config: &MockSourceConfig) -> Vec<SubjectDescription> {
        (0..config.subjects)
            .map(|s| SubjectDescription {
                name: Self::subject_name(s).into(),
                segments: (0..config.segments_per_subject.max(1))
                    .map(|i| {
                        if i == 0 {
                            SegmentDescription::root(Self::segment_name(0), Transform::identity())
                        } else {
                            SegmentDescription::child(
                                Self::segment_name(i),
                                Self::segment_name(i - 1),
                                Transform::from_translation([0.0, 0.0, BONE_LENGTH_MM]),
                            )
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    /// Noise-free pose of one segment at time `t`, relative to its parent.
    pub fn pose_at(subject: usize, segment: usize, t: f64) -> Transform {
        let phase = subject as f64 * 0.5;
        if segment == 0 {
            let angle = 0.25 * TAU * t + phase;
            Transform::from_helical(
                [
                    PATH_RADIUS_MM * angle.cos(),
                    PATH_RADIUS_MM * angle.sin(),
                    1000.0,
                ],
                [0.0, 0.0, angle],
            )
        } else {
            let swing = 0.4 * (TAU * 0.5 * t * segment as f64 + phase).sin();
            Transform::from_helical([0.0, 0.0, BONE_LENGTH_MM], [swing, 0.0, 0.0])
        }
    }

    fn generate_frame(
        config: &MockSourceConfig,
        frame_number: u64,
        timestamp: f64,
        rng: &mut StdRng,
    ) -> RawFrame {
        let subjects = (0..config.subjects)
            .map(|s| SubjectFrame {
                name: Self::subject_name(s).into(),
                segments: (0..config.segments_per_subject.max(1))
                    .map(|i| SegmentFrame {
                        name: Self::segment_name(i).into(),
                        transform: Self::pose_at(s, i, timestamp),
                        occluded: i > 0
                            && config.occlusion_probability > 0.0
                            && rng.random_bool(config.occlusion_probability.min(1.0)),
                    })
                    .collect(),
            })
            .collect();

        RawFrame {
            frame_number,
            timestamp,
            subjects,
        }
    }

    fn run(config: MockSourceConfig, streaming: Arc<AtomicBool>, callback: EventCallback) {
        let period = 1.0 / config.frame_rate_hz;
        // keeps jittered timestamps strictly increasing
        let jitter = config.timestamp_jitter_s.abs().min(0.4 * period);
        let mut rng = StdRng::seed_from_u64(config.seed);

        callback(TransportEvent::Topology(Self::topology(&config)));

        let start = Instant::now();
        let mut frame_number: u64 = 0;
        while streaming.load(Ordering::Relaxed) {
            if let Some(limit) = config.fail_after_frames {
                if frame_number >= limit {
                    warn!(frames = frame_number, "mock source simulating transport failure");
                    streaming.store(false, Ordering::SeqCst);
                    callback(TransportEvent::Disconnected {
                        reason: format!("simulated failure after {frame_number} frames"),
                    });
                    return;
                }
            }

            frame_number += 1;
            let nominal = frame_number as f64 * period;
            let offset = if jitter > 0.0 {
                rng.random_range(-jitter..=jitter)
            } else {
                0.0
            };
            let frame = Self::generate_frame(&config, frame_number, nominal + offset, &mut rng);
            callback(TransportEvent::Frame(frame));
            trace!(frame_number, timestamp = nominal + offset, "mock frame sent");

            let target = Duration::from_secs_f64(nominal);
            let elapsed = start.elapsed();
            if target > elapsed {
                thread::sleep(target - elapsed);
            }
        }

        debug!(frames = frame_number, "mock source stopped");
    }
}

impl FrameSource for MockFrameSource {
    fn describe(&self) -> String {
        format!(
            "mock({} subjects x {} segments @ {} Hz)",
            self.config.subjects, self.config.segments_per_subject, self.config.frame_rate_hz
        )
    }

    fn connect(&mut self, host: &str) -> Result<(), ContractError> {
        if self.config.unreachable_hosts.iter().any(|h| h == host) {
            return Err(ContractError::connection(host, "host unreachable"));
        }
        if !(self.config.frame_rate_hz.is_finite() && self.config.frame_rate_hz > 0.0) {
            return Err(ContractError::connection(
                host,
                format!("invalid mock frame rate {}", self.config.frame_rate_hz),
            ));
        }
        self.host = Some(host.to_string());
        info!(host, "mock source connected");
        Ok(())
    }

    fn start(&mut self, callback: EventCallback) -> Result<(), ContractError> {
        if self.host.is_none() {
            return Err(ContractError::transport("mock source started before connect"));
        }
        // Idempotent: if already streaming, don't start again
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config.clone();
        let streaming = self.streaming.clone();
        let handle = thread::Builder::new()
            .name("mock-frame-source".into())
            .spawn(move || Self::run(config, streaming, callback))
            .map_err(|e| {
                self.streaming.store(false, Ordering::SeqCst);
                ContractError::transport(format!("failed to spawn mock thread: {e}"))
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

impl Drop for MockFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collect(source: &mut MockFrameSource) -> Arc<Mutex<Vec<TransportEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .start(Arc::new(move |event| sink.lock().unwrap().push(event)))
            .unwrap();
        events
    }

    #[test]
    fn test_topology_first_then_increasing_frames() {
        let mut source = MockFrameSource::new(MockSourceConfig {
            frame_rate_hz: 500.0,
            timestamp_jitter_s: 0.01,
            ..Default::default()
        });
        source.connect("localhost").unwrap();
        let events = collect(&mut source);

        thread::sleep(Duration::from_millis(60));
        source.stop();
        assert!(!source.is_streaming());

        let events = events.lock().unwrap();
        assert!(matches!(events[0], TransportEvent::Topology(_)));
        let timestamps: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Frame(f) => Some(f.timestamp),
                _ => None,
            })
            .collect();
        assert!(timestamps.len() > 3);
        assert!(timestamps.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_unreachable_host() {
        let mut source = MockFrameSource::new(MockSourceConfig {
            unreachable_hosts: vec!["nowhere:801".into()],
            ..Default::default()
        });
        let err = source.connect("nowhere:801").unwrap_err();
        assert!(matches!(err, ContractError::Connection { .. }));
        assert!(source.connect("localhost:801").is_ok());
    }

    #[test]
    fn test_start_requires_connect() {
        let mut source = MockFrameSource::with_defaults();
        assert!(source.start(Arc::new(|_| {})).is_err());
    }

    #[test]
    fn test_fail_after_frames_emits_disconnect() {
        let mut source = MockFrameSource::new(MockSourceConfig {
            frame_rate_hz: 1000.0,
            fail_after_frames: Some(3),
            ..Default::default()
        });
        source.connect("localhost").unwrap();
        let events = collect(&mut source);

        thread::sleep(Duration::from_millis(50));
        let events = events.lock().unwrap();
        let frames = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Frame(_)))
            .count();
        assert_eq!(frames, 3);
        assert!(matches!(
            events.last(),
            Some(TransportEvent::Disconnected { .. })
        ));
        assert!(!source.is_streaming());
    }

    #[test]
    fn test_same_seed_same_stream() {
        let config = MockSourceConfig {
            occlusion_probability: 0.3,
            subjects: 2,
            ..Default::default()
        };
        let mut a = StdRng::seed_from_u64(config.seed);
        let mut b = StdRng::seed_from_u64(config.seed);
        for n in 1..20 {
            let fa = MockFrameSource::generate_frame(&config, n, n as f64 * 0.01, &mut a);
            let fb = MockFrameSource::generate_frame(&config, n, n as f64 * 0.01, &mut b);
            for (sa, sb) in fa.subjects.iter().zip(&fb.subjects) {
                for (x, y) in sa.segments.iter().zip(&sb.segments) {
                    assert_eq!(x.occluded, y.occluded);
                    assert_eq!(x.transform, y.transform);
                }
            }
        }
    }

    #[test]
    fn test_topology_is_a_chain() {
        let config = MockSourceConfig {
            segments_per_subject: 3,
            ..Default::default()
        };
        let topology = MockFrameSource::topology(&config);
        let segments = &topology[0].segments;
        assert_eq!(segments.len(), 3);
        assert!(segments[0].parent.is_none());
        assert_eq!(segments[2].parent.as_ref().unwrap(), "Segment1");
    }
}
