//! Rigid transform value type.
//!
//! Canonical storage is a translation plus a unit quaternion. Every other
//! rotation representation (matrix, Euler XYZ, helical) is derived on demand
//! and can be converted back without loss away from singularities.
//!
//! ## Euler XYZ convention
//!
//! Angles `[x, y, z]` in radians describe `R = Rx(x) · Ry(y) · Rz(z)`.
//! When `|R[0][2]|` reaches 1 (y = ±90°) the decomposition is not unique;
//! the z angle is then reported as 0 and x carries the whole remaining
//! rotation about the shared axis.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

const GIMBAL_EPS: f64 = 1e-9;
const NLERP_THRESHOLD: f64 = 1.0 - 1e-6;

/// Rotation representations exposed at the query boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationRepresentation {
    Helical,
    Matrix,
    Quaternion,
    EulerXyz,
}

/// A rotation expressed in one of the [`RotationRepresentation`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationValue {
    /// Rotation vector: unit axis scaled by the angle in radians.
    Helical([f64; 3]),
    /// Row-major 3x3 rotation matrix.
    Matrix([[f64; 3]; 3]),
    /// `[x, y, z, w]`.
    Quaternion([f64; 4]),
    /// `[x, y, z]` radians, see module docs.
    EulerXyz([f64; 3]),
}

/// Translation + rotation.
///
/// Fixed-size `Copy` value; no operation allocates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    translation: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
}

/// Serialized form: plain arrays, quaternion as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TransformRepr {
    translation: [f64; 3],
    rotation: [f64; 4],
}

impl From<TransformRepr> for Transform {
    fn from(repr: TransformRepr) -> Self {
        Transform::from_quaternion(repr.translation, repr.rotation)
    }
}

impl From<Transform> for TransformRepr {
    fn from(transform: Transform) -> Self {
        TransformRepr {
            translation: transform.translation(),
            rotation: transform.quaternion(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn new(translation: [f64; 3], rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation: Vector3::from(translation),
            rotation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self::new(translation, UnitQuaternion::identity())
    }

    /// From an `[x, y, z, w]` quaternion. The input is normalised; a
    /// degenerate (near-zero or non-finite) quaternion yields identity.
    pub fn from_quaternion(translation: [f64; 3], q: [f64; 4]) -> Self {
        let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
        let norm = raw.norm();
        let rotation = if norm.is_finite() && norm > f64::EPSILON {
            UnitQuaternion::new_normalize(raw)
        } else {
            UnitQuaternion::identity()
        };
        Self::new(translation, rotation)
    }

    /// From a row-major rotation matrix.
    pub fn from_matrix(translation: [f64; 3], m: [[f64; 3]; 3]) -> Self {
        let matrix = Matrix3::new(
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        );
        let rotation = Rotation3::from_matrix_unchecked(matrix);
        Self::new(translation, UnitQuaternion::from_rotation_matrix(&rotation))
    }

    /// From Euler XYZ angles (radians), `R = Rx · Ry · Rz`.
    pub fn from_euler_xyz(translation: [f64; 3], angles: [f64; 3]) -> Self {
        let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles[0]);
        let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles[1]);
        let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles[2]);
        Self::new(translation, renormalized(qx * qy * qz))
    }

    /// From a helical (rotation vector) representation.
    pub fn from_helical(translation: [f64; 3], helical: [f64; 3]) -> Self {
        Self::new(
            translation,
            UnitQuaternion::from_scaled_axis(Vector3::from(helical)),
        )
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.translation.x, self.translation.y, self.translation.z]
    }

    pub fn translation_vector(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    /// `[x, y, z, w]`.
    pub fn quaternion(&self) -> [f64; 4] {
        let c = self.rotation.quaternion().coords;
        [c.x, c.y, c.z, c.w]
    }

    /// Row-major rotation matrix.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        let r = self.rotation.to_rotation_matrix();
        let m = r.matrix();
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Euler XYZ angles in radians, see module docs for the gimbal-lock rule.
    pub fn euler_xyz(&self) -> [f64; 3] {
        let m = self.matrix();
        let sin_y = m[0][2].clamp(-1.0, 1.0);
        let y = sin_y.asin();
        if sin_y.abs() < 1.0 - GIMBAL_EPS {
            let x = (-m[1][2]).atan2(m[2][2]);
            let z = (-m[0][1]).atan2(m[0][0]);
            [x, y, z]
        } else {
            let x = m[2][1].atan2(m[1][1]);
            [x, y, 0.0]
        }
    }

    /// Rotation vector, angle in `[0, π]`.
    pub fn helical(&self) -> [f64; 3] {
        let v = self.rotation.scaled_axis();
        [v.x, v.y, v.z]
    }

    pub fn rotation_as(&self, representation: RotationRepresentation) -> RotationValue {
        match representation {
            RotationRepresentation::Helical => RotationValue::Helical(self.helical()),
            RotationRepresentation::Matrix => RotationValue::Matrix(self.matrix()),
            RotationRepresentation::Quaternion => RotationValue::Quaternion(self.quaternion()),
            RotationRepresentation::EulerXyz => RotationValue::EulerXyz(self.euler_xyz()),
        }
    }

    /// `self ∘ child`: express `child` (given relative to `self`) in the
    /// frame `self` is relative to.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.translation + self.rotation * child.translation,
            rotation: renormalized(self.rotation * child.rotation),
        }
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        Transform {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// `self⁻¹ ∘ other`: `other` expressed relative to `self`.
    pub fn relative(&self, other: &Transform) -> Transform {
        self.inverse().compose(other)
    }

    /// Linear translation + spherical rotation interpolation.
    ///
    /// `t` is clamped to `[0, 1]`; the end points are returned bit-exact.
    pub fn interpolate(a: &Transform, b: &Transform, t: f64) -> Transform {
        if t <= 0.0 {
            return *a;
        }
        if t >= 1.0 {
            return *b;
        }
        Transform {
            translation: a.translation.lerp(&b.translation, t),
            rotation: slerp(&a.rotation, &b.rotation, t),
        }
    }
}

/// Shortest-arc spherical interpolation, falling back to normalised lerp
/// for nearly identical rotations. Never panics.
pub fn slerp(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>, t: f64) -> UnitQuaternion<f64> {
    let t = t.clamp(0.0, 1.0);
    let qa = a.quaternion().coords;
    let mut qb = b.quaternion().coords;
    let mut dot = qa.dot(&qb);
    if dot < 0.0 {
        qb = -qb;
        dot = -dot;
    }

    let coords = if dot > NLERP_THRESHOLD {
        qa + (qb - qa) * t
    } else {
        let theta = dot.acos();
        let sin_theta = theta.sin();
        qa * (((1.0 - t) * theta).sin() / sin_theta) + qb * ((t * theta).sin() / sin_theta)
    };
    UnitQuaternion::new_normalize(Quaternion::from_vector(coords))
}

fn renormalized(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(q.into_inner())
}
