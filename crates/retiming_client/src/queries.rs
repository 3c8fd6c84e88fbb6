//! Topology and pose queries against the published snapshot

use contracts::{
    Name, PoseKind, PoseSource, RotationRepresentation, RotationValue, SegmentSnapshot,
    Snapshot, SubjectSnapshot, Transform,
};

use crate::client::RetimingClient;
use crate::error::{Result, RetimingError};

fn subject<'a>(snapshot: &'a Snapshot, name: &str) -> Result<&'a SubjectSnapshot> {
    snapshot
        .subject(name)
        .ok_or_else(|| RetimingError::SubjectNotFound(name.to_string()))
}

fn segment<'a>(subject: &'a SubjectSnapshot, name: &str) -> Result<&'a SegmentSnapshot> {
    subject
        .segment(name)
        .ok_or_else(|| RetimingError::segment_not_found(subject.name.as_str(), name))
}

fn indexed<T>(items: &[T], index: usize) -> Result<&T> {
    items.get(index).ok_or(RetimingError::IndexOutOfRange {
        index,
        count: items.len(),
    })
}

impl RetimingClient {
    // ===== Topology =====

    /// Subjects reported in the current frame (after filtering)
    pub fn subject_count(&self) -> Result<usize> {
        Ok(self.latest_snapshot()?.subjects.len())
    }

    pub fn subject_name(&self, index: usize) -> Result<Name> {
        let snapshot = self.latest_snapshot()?;
        Ok(indexed(&snapshot.subjects, index)?.name.clone())
    }

    pub fn subject_root_segment_name(&self, subject_name: &str) -> Result<Name> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        Ok(indexed(&subject.segments, subject.root)?.name.clone())
    }

    pub fn segment_count(&self, subject_name: &str) -> Result<usize> {
        let snapshot = self.latest_snapshot()?;
        Ok(subject(&snapshot, subject_name)?.segments.len())
    }

    pub fn segment_name(&self, subject_name: &str, index: usize) -> Result<Name> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        Ok(indexed(&subject.segments, index)?.name.clone())
    }

    pub fn segment_child_count(&self, subject_name: &str, segment_name: &str) -> Result<usize> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        Ok(segment(subject, segment_name)?.children.len())
    }

    pub fn segment_child_name(
        &self,
        subject_name: &str,
        segment_name: &str,
        index: usize,
    ) -> Result<Name> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        let child = *indexed(&segment(subject, segment_name)?.children, index)?;
        Ok(indexed(&subject.segments, child)?.name.clone())
    }

    /// Parent segment name; `None` for the root
    pub fn segment_parent_name(
        &self,
        subject_name: &str,
        segment_name: &str,
    ) -> Result<Option<Name>> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        let segment = segment(subject, segment_name)?;
        Ok(subject.parent_of(segment).map(|parent| parent.name.clone()))
    }

    // ===== Poses =====

    /// Static, global or local transform of a segment in the current frame.
    ///
    /// Dynamic kinds fail with `NoData` when the segment has no pose this
    /// frame (occluded, never seen, or its parent has no pose).
    pub fn segment_transform(
        &self,
        subject_name: &str,
        segment_name: &str,
        kind: PoseKind,
    ) -> Result<Transform> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        let segment = segment(subject, segment_name)?;
        let no_data = || RetimingError::NoData {
            subject: subject_name.to_string(),
            segment: segment_name.to_string(),
        };
        match kind {
            PoseKind::Static => Ok(segment.static_transform),
            PoseKind::Global => segment.pose.map(|pose| pose.global).ok_or_else(no_data),
            PoseKind::Local => segment.pose.map(|pose| pose.local).ok_or_else(no_data),
        }
    }

    pub fn segment_rotation(
        &self,
        subject_name: &str,
        segment_name: &str,
        kind: PoseKind,
        representation: RotationRepresentation,
    ) -> Result<RotationValue> {
        self.segment_transform(subject_name, segment_name, kind)
            .map(|transform| transform.rotation_as(representation))
    }

    /// Bind scale; unit scale in lightweight mode
    pub fn segment_static_scale(&self, subject_name: &str, segment_name: &str) -> Result<[f64; 3]> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        Ok(segment(subject, segment_name)?.static_scale)
    }

    /// How the segment's dynamic pose was obtained this frame
    pub fn segment_pose_source(&self, subject_name: &str, segment_name: &str) -> Result<PoseSource> {
        let snapshot = self.latest_snapshot()?;
        let subject = subject(&snapshot, subject_name)?;
        segment(subject, segment_name)?
            .pose
            .map(|pose| pose.source)
            .ok_or_else(|| RetimingError::NoData {
                subject: subject_name.to_string(),
                segment: segment_name.to_string(),
            })
    }

    define_pose_accessors!(PoseKind::Static => {
        segment_static_translation -> [f64; 3] = translation,
        segment_static_rotation_helical -> [f64; 3] = helical,
        segment_static_rotation_matrix -> [[f64; 3]; 3] = matrix,
        segment_static_rotation_quaternion -> [f64; 4] = quaternion,
        segment_static_rotation_euler_xyz -> [f64; 3] = euler_xyz,
    });

    define_pose_accessors!(PoseKind::Global => {
        segment_global_translation -> [f64; 3] = translation,
        segment_global_rotation_helical -> [f64; 3] = helical,
        segment_global_rotation_matrix -> [[f64; 3]; 3] = matrix,
        segment_global_rotation_quaternion -> [f64; 4] = quaternion,
        segment_global_rotation_euler_xyz -> [f64; 3] = euler_xyz,
    });

    define_pose_accessors!(PoseKind::Local => {
        segment_local_translation -> [f64; 3] = translation,
        segment_local_rotation_helical -> [f64; 3] = helical,
        segment_local_rotation_matrix -> [[f64; 3]; 3] = matrix,
        segment_local_rotation_quaternion -> [f64; 4] = quaternion,
        segment_local_rotation_euler_xyz -> [f64; 3] = euler_xyz,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ClientConfig, SegmentDescription, SubjectDescription};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
    use transport::{ManualFeed, ManualFrameSource};

    fn connected() -> (RetimingClient, ManualFeed) {
        let (source, feed) = ManualFrameSource::new();
        let client = RetimingClient::new(Box::new(source), ClientConfig::default()).unwrap();
        client.connect("localhost").unwrap();
        feed.topology(vec![SubjectDescription {
            name: "Arm".into(),
            segments: vec![
                SegmentDescription::root("Shoulder", Transform::identity()),
                SegmentDescription::child(
                    "Elbow",
                    "Shoulder",
                    Transform::from_translation([300.0, 0.0, 0.0]),
                ),
                SegmentDescription::child(
                    "Wrist",
                    "Elbow",
                    Transform::from_translation([250.0, 0.0, 0.0]),
                ),
            ],
        }]);
        (client, feed)
    }

    fn pose_frame(feed: &ManualFeed, t: f64, with_wrist: bool) {
        let shoulder = Transform::from_helical([0.0, 0.0, 1000.0], [0.0, 0.0, FRAC_PI_2]);
        let elbow = Transform::from_translation([300.0, 0.0, 0.0]);
        let wrist = Transform::from_translation([250.0, 0.0, 0.0]);
        let mut segments = vec![("Shoulder", shoulder), ("Elbow", elbow)];
        if with_wrist {
            segments.push(("Wrist", wrist));
        }
        feed.frame(t, "Arm", &segments);
    }

    #[test]
    fn test_topology_queries() {
        let (client, feed) = connected();
        pose_frame(&feed, 1.0, true);
        client.update_frame().unwrap();

        assert_eq!(client.subject_count().unwrap(), 1);
        assert_eq!(client.subject_name(0).unwrap(), "Arm");
        assert_eq!(client.subject_root_segment_name("Arm").unwrap(), "Shoulder");
        assert_eq!(client.segment_count("Arm").unwrap(), 3);
        assert_eq!(client.segment_child_count("Arm", "Shoulder").unwrap(), 1);
        assert_eq!(
            client.segment_child_name("Arm", "Shoulder", 0).unwrap(),
            "Elbow"
        );
        assert_eq!(
            client.segment_parent_name("Arm", "Wrist").unwrap().unwrap(),
            "Elbow"
        );
        assert!(client
            .segment_parent_name("Arm", "Shoulder")
            .unwrap()
            .is_none());

        assert!(matches!(
            client.subject_name(1),
            Err(RetimingError::IndexOutOfRange { index: 1, count: 1 })
        ));
        assert!(matches!(
            client.segment_count("Leg"),
            Err(RetimingError::SubjectNotFound(_))
        ));
        assert!(matches!(
            client.segment_child_count("Arm", "Hand"),
            Err(RetimingError::SegmentNotFound { .. })
        ));
    }

    #[test]
    fn test_global_composes_hierarchy() {
        let (client, feed) = connected();
        pose_frame(&feed, 1.0, true);
        client.update_frame().unwrap();

        // shoulder turned 90 degrees about z: the arm points along +y
        let wrist = client.segment_global_translation("Arm", "Wrist").unwrap();
        assert!((wrist[0] - 0.0).abs() < 1e-6);
        assert!((wrist[1] - 550.0).abs() < 1e-6);
        assert!((wrist[2] - 1000.0).abs() < 1e-6);

        let local = client.segment_local_translation("Arm", "Wrist").unwrap();
        assert!((local[0] - 250.0).abs() < 1e-9);

        let stat = client.segment_static_translation("Arm", "Elbow").unwrap();
        assert_eq!(stat, [300.0, 0.0, 0.0]);
        assert_eq!(client.segment_static_scale("Arm", "Elbow").unwrap(), [1.0; 3]);

        let q = client
            .segment_global_rotation_quaternion("Arm", "Shoulder")
            .unwrap();
        assert!((q[2] - FRAC_PI_4.sin()).abs() < 1e-9);
        assert!((q[3] - FRAC_PI_4.cos()).abs() < 1e-9);
        let euler = client
            .segment_global_rotation_euler_xyz("Arm", "Wrist")
            .unwrap();
        assert!((euler[2] - FRAC_PI_2).abs() < 1e-9);
        assert_eq!(
            client
                .segment_rotation("Arm", "Wrist", PoseKind::Global, RotationRepresentation::Helical)
                .unwrap(),
            RotationValue::Helical(client.segment_global_rotation_helical("Arm", "Wrist").unwrap())
        );
    }

    #[test]
    fn test_missing_segment_has_no_data() {
        let (client, feed) = connected();
        pose_frame(&feed, 1.0, false);
        client.update_frame().unwrap();

        assert!(client.segment_global_translation("Arm", "Elbow").is_ok());
        assert!(matches!(
            client.segment_global_translation("Arm", "Wrist"),
            Err(RetimingError::NoData { .. })
        ));
        // static data is available without samples
        assert!(client.segment_static_rotation_matrix("Arm", "Wrist").is_ok());
    }

    #[test]
    fn test_no_frame_before_first_update() {
        let (client, _feed) = connected();
        assert!(matches!(
            client.subject_count(),
            Err(RetimingError::NoNewFrame)
        ));
    }
}
