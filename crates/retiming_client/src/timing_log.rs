//! JSON-lines timing logs
//!
//! The client log gets one record per published snapshot, the stream log
//! one record per frame received from the source. Wall times are seconds
//! since the log was opened.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use contracts::{CycleReport, RawFrame};
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

struct LogFile {
    writer: BufWriter<File>,
    opened: Instant,
}

impl LogFile {
    fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            opened: Instant::now(),
        })
    }

    fn write<T: Serialize>(&mut self, record: &T) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }
}

#[derive(Serialize)]
struct ClientRecord<'a> {
    wall_s: f64,
    #[serde(flatten)]
    report: &'a CycleReport,
}

/// Stream log fields of one received frame, captured before the frame is queued
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameTiming {
    frame_number: u64,
    timestamp: f64,
    subjects: usize,
    segments: usize,
}

impl FrameTiming {
    pub fn of(frame: &RawFrame) -> Self {
        Self {
            frame_number: frame.frame_number,
            timestamp: frame.timestamp,
            subjects: frame.subjects.len(),
            segments: frame.subjects.iter().map(|s| s.segments.len()).sum(),
        }
    }

    pub fn segments(&self) -> usize {
        self.segments
    }
}

#[derive(Serialize)]
struct StreamRecord {
    wall_s: f64,
    #[serde(flatten)]
    frame: FrameTiming,
}

/// Client and stream timing logs; either may be disabled
#[derive(Default)]
pub struct TimingLogs {
    client: Mutex<Option<LogFile>>,
    stream: Mutex<Option<LogFile>>,
}

fn lock(slot: &Mutex<Option<LogFile>>) -> MutexGuard<'_, Option<LogFile>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TimingLogs {
    /// Replace both logs. An empty path disables that log.
    pub fn open(&self, client_log: &Path, stream_log: &Path) -> Result<()> {
        let client = open_optional(client_log)?;
        let stream = open_optional(stream_log)?;
        replace(&self.client, client);
        replace(&self.stream, stream);
        Ok(())
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        let mut slot = lock(&self.client);
        if let Some(log) = slot.as_mut() {
            let record = ClientRecord {
                wall_s: log.opened.elapsed().as_secs_f64(),
                report,
            };
            if let Err(error) = log.write(&record) {
                warn!(error = %error, "client timing log write failed, disabling");
                *slot = None;
            }
        }
    }

    pub fn record_frame(&self, frame: FrameTiming) {
        let mut slot = lock(&self.stream);
        if let Some(log) = slot.as_mut() {
            let record = StreamRecord {
                wall_s: log.opened.elapsed().as_secs_f64(),
                frame,
            };
            if let Err(error) = log.write(&record) {
                warn!(error = %error, "stream timing log write failed, disabling");
                *slot = None;
            }
        }
    }

    /// Flush and close both logs
    pub fn close(&self) {
        replace(&self.client, None);
        replace(&self.stream, None);
    }

    /// Hold the stream log busy until the guard drops
    #[cfg(test)]
    pub(crate) fn stall_stream_log(&self) -> impl Sized + '_ {
        lock(&self.stream)
    }
}

fn open_optional(path: &Path) -> Result<Option<LogFile>> {
    if path.as_os_str().is_empty() {
        Ok(None)
    } else {
        LogFile::create(path).map(Some)
    }
}

fn replace(slot: &Mutex<Option<LogFile>>, log: Option<LogFile>) {
    let previous = std::mem::replace(&mut *lock(slot), log);
    if let Some(mut previous) = previous {
        if let Err(error) = previous.writer.flush() {
            warn!(error = %error, "failed to flush timing log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SegmentFrame, SubjectFrame, Transform};

    #[test]
    fn test_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let client_path = dir.path().join("client.jsonl");
        let stream_path = dir.path().join("stream.jsonl");

        let logs = TimingLogs::default();
        logs.open(&client_path, &stream_path).unwrap();

        logs.record_cycle(&CycleReport {
            frame_number: 1,
            t_query: 0.5,
            interpolated: 4,
            ..Default::default()
        });
        logs.record_frame(FrameTiming::of(&RawFrame {
            frame_number: 9,
            timestamp: 0.52,
            subjects: vec![SubjectFrame {
                name: "Actor".into(),
                segments: vec![SegmentFrame {
                    name: "Hips".into(),
                    transform: Transform::identity(),
                    occluded: false,
                }],
            }],
        }));
        logs.close();
        assert!(lock(&logs.client).is_none());
        assert!(lock(&logs.stream).is_none());

        let client = std::fs::read_to_string(&client_path).unwrap();
        let record: serde_json::Value = serde_json::from_str(client.trim()).unwrap();
        assert_eq!(record["frame_number"], 1);
        assert_eq!(record["interpolated"], 4);
        assert!(record["wall_s"].is_number());

        let stream = std::fs::read_to_string(&stream_path).unwrap();
        let record: serde_json::Value = serde_json::from_str(stream.trim()).unwrap();
        assert_eq!(record["frame_number"], 9);
        assert_eq!(record["subjects"], 1);
        assert_eq!(record["segments"], 1);
    }

    #[test]
    fn test_empty_path_disables() {
        let dir = tempfile::tempdir().unwrap();
        let logs = TimingLogs::default();
        logs.open(&dir.path().join("client.jsonl"), Path::new(""))
            .unwrap();
        assert!(lock(&logs.stream).is_none());
        assert!(lock(&logs.client).is_some());
    }
}
