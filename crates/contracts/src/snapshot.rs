//! Snapshot - Retiming engine output
//!
//! A coherent, immutable view of every reported segment at one query time.
//! Published snapshots are shared behind `Arc` and never mutated.

use serde::Serialize;
use std::collections::HashMap;

use crate::{Name, Transform};

/// Which transform of a segment a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseKind {
    /// Bind pose relative to the parent.
    Static,
    /// Relative to world.
    Global,
    /// Relative to the parent, at the query time.
    Local,
}

/// How a dynamic pose was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSource {
    /// Between two samples (or exactly on one).
    Interpolated,
    /// Extrapolated within the prediction ceiling.
    Predicted,
    /// Extrapolated up to the ceiling; the query time was further ahead.
    Clamped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentPose {
    pub global: Transform,
    pub local: Transform,
    pub source: PoseSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentSnapshot {
    pub name: Name,
    /// Index into the owning subject's `segments`.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub static_transform: Transform,
    pub static_scale: [f64; 3],
    /// `None` when the segment has no usable data this cycle.
    pub pose: Option<SegmentPose>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectSnapshot {
    pub name: Name,
    pub root: usize,
    pub segments: Vec<SegmentSnapshot>,
    #[serde(skip)]
    index: HashMap<Name, usize>,
}

impl SubjectSnapshot {
    pub fn new(name: Name, root: usize, segments: Vec<SegmentSnapshot>) -> Self {
        let index = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| (segment.name.clone(), i))
            .collect();
        Self {
            name,
            root,
            segments,
            index,
        }
    }

    pub fn segment_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn segment(&self, name: &str) -> Option<&SegmentSnapshot> {
        self.segment_index(name).map(|i| &self.segments[i])
    }

    pub fn root_segment(&self) -> Option<&SegmentSnapshot> {
        self.segments.get(self.root)
    }

    pub fn parent_of(&self, segment: &SegmentSnapshot) -> Option<&SegmentSnapshot> {
        segment.parent.and_then(|i| self.segments.get(i))
    }
}

/// Published retiming output.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Publication counter, starts at 1.
    pub frame_number: u64,
    /// Time the poses were evaluated at (source clock, seconds).
    pub t_query: f64,
    /// Newest capture timestamp ingested when this snapshot was built.
    pub latest_timestamp: f64,
    pub subjects: Vec<SubjectSnapshot>,
    #[serde(skip)]
    index: HashMap<Name, usize>,
}

impl Snapshot {
    pub fn new(
        frame_number: u64,
        t_query: f64,
        latest_timestamp: f64,
        subjects: Vec<SubjectSnapshot>,
    ) -> Self {
        let index = subjects
            .iter()
            .enumerate()
            .map(|(i, subject)| (subject.name.clone(), i))
            .collect();
        Self {
            frame_number,
            t_query,
            latest_timestamp,
            subjects,
            index,
        }
    }

    pub fn subject(&self, name: &str) -> Option<&SubjectSnapshot> {
        self.index.get(name).map(|&i| &self.subjects[i])
    }

    /// Number of segments with a pose in this snapshot.
    pub fn posed_segment_count(&self) -> usize {
        self.subjects
            .iter()
            .flat_map(|subject| subject.segments.iter())
            .filter(|segment| segment.pose.is_some())
            .count()
    }
}

/// Per-cycle retiming statistics, produced alongside each snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub frame_number: u64,
    pub t_query: f64,
    pub latest_timestamp: f64,
    /// `t_query - latest_timestamp`; positive when the cycle extrapolates
    pub lead_s: f64,
    pub interpolated: u32,
    pub predicted: u32,
    pub clamped: u32,
    pub absent: u32,
    /// Store totals at the end of the cycle
    pub samples_rejected: u64,
    pub samples_evicted: u64,
}

impl CycleReport {
    pub fn posed(&self) -> u32 {
        self.interpolated + self.predicted + self.clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, parent: Option<usize>, posed: bool) -> SegmentSnapshot {
        SegmentSnapshot {
            name: name.into(),
            parent,
            children: Vec::new(),
            static_transform: Transform::identity(),
            static_scale: [1.0; 3],
            pose: posed.then(|| SegmentPose {
                global: Transform::identity(),
                local: Transform::identity(),
                source: PoseSource::Interpolated,
            }),
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let subject = SubjectSnapshot::new(
            "Actor".into(),
            0,
            vec![segment("Hips", None, true), segment("Spine", Some(0), false)],
        );
        let snapshot = Snapshot::new(1, 0.5, 0.52, vec![subject]);

        let actor = snapshot.subject("Actor").unwrap();
        let spine = actor.segment("Spine").unwrap();
        assert_eq!(actor.parent_of(spine).unwrap().name, "Hips");
        assert_eq!(actor.root_segment().unwrap().name, "Hips");
        assert!(snapshot.subject("Nobody").is_none());
        assert_eq!(snapshot.posed_segment_count(), 1);
    }
}
