//! Lightweight segment data path.
//!
//! Reduces ingested poses to the precision of the compact wire format:
//! 16-bit quaternion components and 0.1 mm translations.

use contracts::Transform;

const QUATERNION_SCALE: f64 = i16::MAX as f64;
const TRANSLATION_STEP_MM: f64 = 0.1;

/// Quantise a transform to lightweight precision.
pub fn quantise(transform: &Transform) -> Transform {
    let t = transform.translation();
    let translation = t.map(|v| (v / TRANSLATION_STEP_MM).round() * TRANSLATION_STEP_MM);
    let quaternion = transform
        .quaternion()
        .map(|c| (c.clamp(-1.0, 1.0) * QUATERNION_SCALE).round() / QUATERNION_SCALE);
    Transform::from_quaternion(translation, quaternion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_rounded_to_tenth_mm() {
        let t = Transform::from_translation([1.234, -5.06, 100.0]);
        let q = quantise(&t).translation();
        assert!((q[0] - 1.2).abs() < 1e-9);
        assert!((q[1] + 5.1).abs() < 1e-9);
        assert!((q[2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_error_is_small() {
        let t = Transform::from_euler_xyz([0.0; 3], [0.4, -1.2, 2.5]);
        let q = quantise(&t);
        assert!(q.rotation().angle_to(&t.rotation()) < 1e-3);
    }

    #[test]
    fn test_idempotent() {
        let t = Transform::from_euler_xyz([12.345, 6.789, -0.05], [0.1, 0.2, 0.3]);
        let once = quantise(&t);
        let twice = quantise(&once);
        assert!(once.rotation().angle_to(&twice.rotation()) < 1e-6);
        for (a, b) in once.translation().iter().zip(twice.translation()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
