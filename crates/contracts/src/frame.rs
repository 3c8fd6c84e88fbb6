//! Transport-side data: topology descriptions and raw capture frames.

use serde::{Deserialize, Serialize};

use crate::{Name, Transform};

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

/// One segment as announced by the discovery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDescription {
    pub name: Name,

    /// `None` for the subject's root segment.
    #[serde(default)]
    pub parent: Option<Name>,

    /// Bind pose relative to the parent.
    #[serde(default)]
    pub static_transform: Transform,

    #[serde(default = "unit_scale")]
    pub static_scale: [f64; 3],
}

impl SegmentDescription {
    pub fn root(name: impl Into<Name>, static_transform: Transform) -> Self {
        Self {
            name: name.into(),
            parent: None,
            static_transform,
            static_scale: unit_scale(),
        }
    }

    pub fn child(
        name: impl Into<Name>,
        parent: impl Into<Name>,
        static_transform: Transform,
    ) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
            static_transform,
            static_scale: unit_scale(),
        }
    }
}

/// A tracked articulated body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDescription {
    pub name: Name,
    pub segments: Vec<SegmentDescription>,
}

/// One segment's measured pose in a frame, relative to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentFrame {
    pub name: Name,
    pub transform: Transform,
    #[serde(default)]
    pub occluded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectFrame {
    pub name: Name,
    pub segments: Vec<SegmentFrame>,
}

/// A capture frame as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    /// Source frame counter (diagnostics only).
    pub frame_number: u64,

    /// Capture timestamp, seconds on the source clock.
    pub timestamp: f64,

    pub subjects: Vec<SubjectFrame>,
}

/// Everything a transport can tell the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEvent {
    /// Full subject set; replaces the previous one.
    Topology(Vec<SubjectDescription>),
    Frame(RawFrame),
    /// Fatal loss of the source.
    Disconnected { reason: String },
}
