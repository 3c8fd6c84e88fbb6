//! Axis mapping: a signed permutation of the source coordinate axes.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Transform;

/// One signed source axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisDirection {
    #[serde(rename = "+x")]
    PosX,
    #[serde(rename = "-x")]
    NegX,
    #[serde(rename = "+y")]
    PosY,
    #[serde(rename = "-y")]
    NegY,
    #[serde(rename = "+z")]
    PosZ,
    #[serde(rename = "-z")]
    NegZ,
}

impl AxisDirection {
    /// Wire encoding table, shared with the exported boundary.
    const WIRE: [(AxisDirection, u32); 6] = [
        (AxisDirection::PosX, 0),
        (AxisDirection::NegX, 1),
        (AxisDirection::PosY, 2),
        (AxisDirection::NegY, 3),
        (AxisDirection::PosZ, 4),
        (AxisDirection::NegZ, 5),
    ];

    pub fn to_wire(self) -> u32 {
        Self::WIRE
            .iter()
            .find(|(direction, _)| *direction == self)
            .map(|(_, code)| *code)
            .unwrap_or_default()
    }

    pub fn from_wire(code: u32) -> Option<Self> {
        Self::WIRE
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(direction, _)| *direction)
    }

    /// Index of the source axis (0 = x, 1 = y, 2 = z).
    pub fn axis_index(self) -> usize {
        match self {
            AxisDirection::PosX | AxisDirection::NegX => 0,
            AxisDirection::PosY | AxisDirection::NegY => 1,
            AxisDirection::PosZ | AxisDirection::NegZ => 2,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            AxisDirection::PosX | AxisDirection::PosY | AxisDirection::PosZ => 1.0,
            AxisDirection::NegX | AxisDirection::NegY | AxisDirection::NegZ => -1.0,
        }
    }
}

/// Reasons an axis triple is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AxisMappingError {
    #[error("axis mapping uses the same source axis twice")]
    CoLinear,
    #[error("axis mapping is left-handed")]
    LeftHanded,
}

/// Output axis `x` takes the source direction `self.x`, and so on.
///
/// Applied to a transform as `t' = M t`, `R' = M R Mᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub x: AxisDirection,
    pub y: AxisDirection,
    pub z: AxisDirection,
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            x: AxisDirection::PosX,
            y: AxisDirection::PosY,
            z: AxisDirection::PosZ,
        }
    }
}

impl AxisMapping {
    /// Build a mapping, refusing colinear or left-handed triples.
    pub fn new(
        x: AxisDirection,
        y: AxisDirection,
        z: AxisDirection,
    ) -> Result<Self, AxisMappingError> {
        let mapping = Self { x, y, z };
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn validate(&self) -> Result<(), AxisMappingError> {
        let (a, b, c) = (
            self.x.axis_index(),
            self.y.axis_index(),
            self.z.axis_index(),
        );
        if a == b || b == c || a == c {
            return Err(AxisMappingError::CoLinear);
        }
        if self.matrix().determinant() < 0.0 {
            return Err(AxisMappingError::LeftHanded);
        }
        Ok(())
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn matrix(&self) -> Matrix3<f64> {
        let mut m = Matrix3::zeros();
        for (row, direction) in [self.x, self.y, self.z].into_iter().enumerate() {
            m[(row, direction.axis_index())] = direction.sign();
        }
        m
    }

    /// Re-express a transform in the mapped coordinate frame.
    pub fn apply(&self, transform: &Transform) -> Transform {
        if self.is_identity() {
            return *transform;
        }
        let m = self.matrix();
        let translation: Vector3<f64> = m * transform.translation_vector();
        let r = transform.rotation().to_rotation_matrix().into_inner();
        let mapped = Rotation3::from_matrix_unchecked(m * r * m.transpose());
        Transform::new(
            [translation.x, translation.y, translation.z],
            UnitQuaternion::from_rotation_matrix(&mapped),
        )
    }
}
