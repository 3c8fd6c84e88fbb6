//! Main retiming engine implementation.

use contracts::{
    AxisMapping, ClientConfig, CycleReport, Name, PoseSource, RawFrame, SegmentId, SegmentPose,
    SegmentSnapshot, Snapshot, SubjectDescription, SubjectSnapshot, Transform,
};
use std::collections::HashMap;
use tracing::instrument;

use crate::data_path;
use crate::error::{EngineError, Result};
use crate::predictor::Predictor;
use crate::registry::{Registry, SubjectEntry, TopologyUpdate};
use crate::store::{Bracket, SampleStore, StoreStats};

const UNIT_SCALE: [f64; 3] = [1.0, 1.0, 1.0];

/// Per-cycle tunables, copied by the caller before each update
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub output_latency_s: f64,
    pub maximum_prediction_s: f64,
    pub axis_mapping: AxisMapping,
    pub lightweight: bool,
    /// Subjects to report; empty means all
    pub subject_filter: Vec<Name>,
}

impl EngineSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            output_latency_s: config.output_latency_s,
            maximum_prediction_s: config.maximum_prediction_s,
            axis_mapping: config.axis_mapping,
            lightweight: config.lightweight_segment_data,
            subject_filter: config.subject_filter.clone(),
        }
    }

    pub fn reports(&self, subject: &str) -> bool {
        self.subject_filter.is_empty() || self.subject_filter.iter().any(|name| name == subject)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Per-frame ingestion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameIngest {
    pub accepted: u32,
    pub rejected: u32,
    /// Samples for subjects or segments absent from the registry
    pub unknown: u32,
}

/// Engine-wide diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub frames_ingested: u64,
    pub frames_published: u64,
    pub subjects: usize,
    pub segments: usize,
    pub latest_timestamp: Option<f64>,
    pub store: StoreStats,
}

/// Retiming engine
///
/// Single-writer: ingestion and update cycles take `&mut self`.
#[derive(Debug)]
pub struct RetimingEngine {
    registry: Registry,
    store: SampleStore,
    predictor: Predictor,
    jitter_margin_s: f64,
    /// Newest capture timestamp ingested
    latest_timestamp: Option<f64>,
    /// Query time of the last published snapshot
    last_t_query: Option<f64>,
    frame_number: u64,
    frames_ingested: u64,
}

impl RetimingEngine {
    pub fn new(config: &ClientConfig) -> Self {
        let jitter_margin_s = config.history.jitter_margin_s;
        let retention = retention_window(
            config.output_latency_s,
            config.maximum_prediction_s,
            jitter_margin_s,
        );
        Self {
            registry: Registry::new(),
            store: SampleStore::new(config.history.max_samples, retention),
            predictor: Predictor::new(config.prediction.clone()),
            jitter_margin_s,
            latest_timestamp: None,
            last_t_query: None,
            frame_number: 0,
            frames_ingested: 0,
        }
    }

    /// Replace the subject set. Histories of removed subjects and segments are dropped.
    #[instrument(name = "retiming_apply_topology", skip_all, fields(subjects = subjects.len()))]
    pub fn apply_topology(&mut self, subjects: &[SubjectDescription]) -> TopologyUpdate {
        let update = self.registry.apply_topology(subjects);

        for (subject, error) in &update.rejected {
            tracing::warn!(subject = %subject, error = %error, "subject rejected");
            metrics::counter!("retiming_subjects_rejected_total").increment(1);
        }
        if !update.added.is_empty() || !update.removed.is_empty() {
            tracing::info!(
                added = ?update.added,
                removed = ?update.removed,
                total = self.registry.subject_count(),
                "topology updated"
            );
        }

        let registry = &self.registry;
        let dropped = self.store.retain(|id| registry.contains(id));
        if dropped > 0 {
            tracing::debug!(dropped, "dropped histories of removed segments");
        }
        update
    }

    /// Record every segment sample of a frame.
    ///
    /// Rejected samples are counted and logged; they never abort the frame.
    #[instrument(
        level = "trace",
        name = "retiming_ingest_frame",
        skip(self, frame),
        fields(frame_number = frame.frame_number, timestamp = frame.timestamp)
    )]
    pub fn ingest_frame(&mut self, frame: &RawFrame, lightweight: bool) -> FrameIngest {
        let mut counts = FrameIngest::default();

        for subject in &frame.subjects {
            let Some(entry) = self.registry.subject(&subject.name) else {
                counts.unknown += subject.segments.len() as u32;
                continue;
            };
            for segment in &subject.segments {
                if entry.segment_key(&segment.name).is_none() {
                    counts.unknown += 1;
                    continue;
                }
                let id = SegmentId::new(subject.name.clone(), segment.name.clone());
                let transform = if lightweight {
                    data_path::quantise(&segment.transform)
                } else {
                    segment.transform
                };
                match self
                    .store
                    .record(&id, frame.timestamp, transform, !segment.occluded)
                {
                    Ok(()) => counts.accepted += 1,
                    Err(error) => {
                        counts.rejected += 1;
                        tracing::debug!(error = %error, "sample rejected");
                    }
                }
            }
        }

        if counts.rejected > 0 {
            tracing::warn!(
                frame_number = frame.frame_number,
                timestamp = frame.timestamp,
                rejected = counts.rejected,
                "out-of-order samples dropped"
            );
            metrics::counter!("retiming_samples_rejected_total").increment(counts.rejected as u64);
        }
        if counts.unknown > 0 {
            tracing::trace!(unknown = counts.unknown, "samples for unregistered segments");
        }

        if frame.timestamp.is_finite() && self.latest_timestamp.map_or(true, |t| frame.timestamp > t)
        {
            self.latest_timestamp = Some(frame.timestamp);
        }
        self.frames_ingested += 1;
        counts
    }

    /// Run one retiming cycle at `T_latest - OutputLatency + offset`.
    ///
    /// Returns `NoNewFrame` when nothing was ever ingested or the query time
    /// did not advance past the last published one.
    #[instrument(name = "retiming_update", level = "debug", skip(self, settings))]
    pub fn update(
        &mut self,
        settings: &EngineSettings,
        offset: f64,
    ) -> Result<(Snapshot, CycleReport)> {
        let retention = retention_window(
            settings.output_latency_s,
            settings.maximum_prediction_s,
            self.jitter_margin_s,
        );
        self.store.set_retention(retention);

        let latest = self.latest_timestamp.ok_or(EngineError::NoNewFrame)?;
        let t_query = latest - settings.output_latency_s + offset;
        if !t_query.is_finite() || self.last_t_query.is_some_and(|last| t_query <= last) {
            return Err(EngineError::NoNewFrame);
        }

        // segments the source stopped reporting fall out of the window
        let expired = self.store.expire_before(latest - retention);
        if expired > 0 {
            tracing::debug!(expired, "silent segments expired");
            metrics::counter!("retiming_segments_expired_total").increment(expired as u64);
        }

        let mut report = CycleReport {
            t_query,
            latest_timestamp: latest,
            lead_s: t_query - latest,
            ..Default::default()
        };

        let subjects: Vec<SubjectSnapshot> = self
            .registry
            .subjects()
            .iter()
            .filter(|subject| settings.reports(&subject.name) && self.is_reported(subject))
            .map(|subject| self.evaluate_subject(subject, t_query, settings, &mut report))
            .collect();

        self.last_t_query = Some(t_query);
        self.frame_number += 1;

        let stats = self.store.stats();
        report.frame_number = self.frame_number;
        report.samples_rejected = stats.rejected;
        report.samples_evicted = stats.evicted;

        tracing::trace!(
            frame_number = report.frame_number,
            t_query,
            posed = report.posed(),
            absent = report.absent,
            "snapshot built"
        );

        Ok((
            Snapshot::new(self.frame_number, t_query, latest, subjects),
            report,
        ))
    }

    fn evaluate_subject(
        &self,
        subject: &SubjectEntry,
        t_query: f64,
        settings: &EngineSettings,
        report: &mut CycleReport,
    ) -> SubjectSnapshot {
        let keys = subject.segment_keys();
        let position: HashMap<usize, usize> =
            keys.iter().enumerate().map(|(i, &key)| (key, i)).collect();

        let mut globals: Vec<Option<Transform>> = Vec::with_capacity(keys.len());
        let mut segments = Vec::with_capacity(keys.len());

        for &key in keys {
            let Some(node) = self.registry.segment(key) else {
                continue;
            };
            let parent = node.parent.and_then(|p| position.get(&p).copied());
            let children = node
                .children
                .iter()
                .filter_map(|c| position.get(c).copied())
                .collect();

            let id = SegmentId::new(subject.name.clone(), node.name.clone());
            let pose = self
                .evaluate_segment(&id, t_query, settings.maximum_prediction_s)
                .and_then(|(local, source)| {
                    let global = match parent {
                        None => Some(local),
                        Some(p) => globals
                            .get(p)
                            .copied()
                            .flatten()
                            .map(|pg: Transform| pg.compose(&local)),
                    };
                    global.map(|global| (global, local, source))
                });

            globals.push(pose.map(|(global, _, _)| global));

            match pose.map(|(_, _, source)| source) {
                Some(PoseSource::Interpolated) => report.interpolated += 1,
                Some(PoseSource::Predicted) => report.predicted += 1,
                Some(PoseSource::Clamped) => report.clamped += 1,
                None => report.absent += 1,
            }

            let mapping = &settings.axis_mapping;
            segments.push(SegmentSnapshot {
                name: node.name.clone(),
                parent,
                children,
                static_transform: mapping.apply(&node.static_transform),
                static_scale: if settings.lightweight {
                    UNIT_SCALE
                } else {
                    node.static_scale
                },
                pose: pose.map(|(global, local, source)| SegmentPose {
                    global: mapping.apply(&global),
                    local: mapping.apply(&local),
                    source,
                }),
            });
        }

        let root = position.get(&subject.root).copied().unwrap_or(0);
        SubjectSnapshot::new(subject.name.clone(), root, segments)
    }

    /// Whether any segment of `subject` still has a history in the window
    fn is_reported(&self, subject: &SubjectEntry) -> bool {
        subject.segment_keys().iter().any(|&key| {
            self.registry.segment(key).is_some_and(|node| {
                let id = SegmentId::new(subject.name.clone(), node.name.clone());
                self.store.history(&id).is_some()
            })
        })
    }

    /// Parent-relative pose of one segment at `t_query`.
    fn evaluate_segment(
        &self,
        id: &SegmentId,
        t_query: f64,
        maximum_prediction_s: f64,
    ) -> Option<(Transform, PoseSource)> {
        match self.store.query_bracket(id, t_query) {
            Bracket::Interpolate { from, to, factor } => Some((
                Transform::interpolate(&from.transform, &to.transform, factor),
                PoseSource::Interpolated,
            )),
            Bracket::ExtrapolateForward { history } => {
                let ahead = t_query - history.newest().timestamp;
                let (dt, source) = if ahead > maximum_prediction_s {
                    (maximum_prediction_s, PoseSource::Clamped)
                } else {
                    (ahead, PoseSource::Predicted)
                };
                self.predictor
                    .predict(history.as_slice(), dt)
                    .map(|transform| (transform, source))
            }
            Bracket::NoData => None,
        }
    }

    /// Forget all subjects, samples and publication state.
    pub fn reset(&mut self) {
        self.registry.apply_topology(&[]);
        self.store.clear();
        self.latest_timestamp = None;
        self.last_t_query = None;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn latest_timestamp(&self) -> Option<f64> {
        self.latest_timestamp
    }

    pub fn last_t_query(&self) -> Option<f64> {
        self.last_t_query
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            frames_ingested: self.frames_ingested,
            frames_published: self.frame_number,
            subjects: self.registry.subject_count(),
            segments: self.registry.segment_count(),
            latest_timestamp: self.latest_timestamp,
            store: self.store.stats(),
        }
    }
}

/// History kept behind the newest sample: the interpolation window, the
/// prediction horizon and a jitter margin.
fn retention_window(output_latency_s: f64, maximum_prediction_s: f64, jitter_margin_s: f64) -> f64 {
    output_latency_s.max(0.0) + maximum_prediction_s.max(0.0) + jitter_margin_s.max(0.0)
}
