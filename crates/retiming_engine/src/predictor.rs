//! Bounded extrapolation past the newest sample.
//!
//! Translation uses a constant-velocity model, upgraded to constant
//! acceleration when three samples agree on a plausible acceleration.
//! Rotation advances at the angular velocity between the two newest samples.
//!
//! All limits come from `PredictionConfig`; the predictor is stateless and
//! deterministic for a given history.

use contracts::{PredictionConfig, Transform};
use nalgebra::{UnitQuaternion, Vector3};

use crate::store::Sample;

const MIN_SPAN_S: f64 = 1e-9;

/// Extrapolation policy
#[derive(Debug, Clone)]
pub struct Predictor {
    config: PredictionConfig,
}

impl Predictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Pose `dt` seconds after the newest sample of `history` (oldest first).
    ///
    /// A single sample, or `dt <= 0`, holds the newest sample.
    pub fn predict(&self, history: &[Sample], dt: f64) -> Option<Transform> {
        let newest = history.last()?;
        if history.len() < 2 || dt.is_nan() || dt <= 0.0 {
            return Some(newest.transform);
        }

        let translation = self.predict_translation(history, dt);
        let rotation = self.predict_rotation(history, dt);
        Some(Transform::new(
            [translation.x, translation.y, translation.z],
            rotation,
        ))
    }

    fn predict_translation(&self, history: &[Sample], dt: f64) -> Vector3<f64> {
        let n = history.len();
        let (s2, s3) = (&history[n - 2], &history[n - 1]);
        let p3 = s3.transform.translation_vector();
        let span = s3.timestamp - s2.timestamp;
        if span < MIN_SPAN_S {
            return p3;
        }

        let v23 = (p3 - s2.transform.translation_vector()) / span;

        if n >= 3 {
            if let Some(acceleration) = self.estimate_acceleration(&history[n - 3..]) {
                // v23 is the mean velocity over [t2, t3], i.e. the velocity at its midpoint
                let v3 = clamp_norm(
                    v23 + acceleration * (span / 2.0),
                    self.config.max_linear_velocity,
                );
                return p3 + v3 * dt + acceleration * (0.5 * dt * dt);
            }
        }

        p3 + clamp_norm(v23, self.config.max_linear_velocity) * dt
    }

    /// Acceleration implied by the constant-velocity residual at the newest
    /// sample, or `None` when it exceeds the configured bound.
    fn estimate_acceleration(&self, samples: &[Sample]) -> Option<Vector3<f64>> {
        let [s1, s2, s3] = samples else {
            return None;
        };
        let (t1, t2, t3) = (s1.timestamp, s2.timestamp, s3.timestamp);
        if t2 - t1 < MIN_SPAN_S || t3 - t2 < MIN_SPAN_S {
            return None;
        }

        let p1 = s1.transform.translation_vector();
        let p2 = s2.transform.translation_vector();
        let p3 = s3.transform.translation_vector();

        let v12 = (p2 - p1) / (t2 - t1);
        let residual = p3 - (p2 + v12 * (t3 - t2));
        let acceleration = residual * (2.0 / ((t3 - t2) * (t3 - t1)));

        (acceleration.norm() <= self.config.max_linear_acceleration).then_some(acceleration)
    }

    fn predict_rotation(&self, history: &[Sample], dt: f64) -> UnitQuaternion<f64> {
        let n = history.len();
        let (s2, s3) = (&history[n - 2], &history[n - 1]);
        let q3 = s3.transform.rotation();
        let span = s3.timestamp - s2.timestamp;
        if span < MIN_SPAN_S {
            return q3;
        }

        let delta = q3 * s2.transform.rotation().inverse();
        let omega = clamp_norm(delta.scaled_axis() / span, self.config.max_angular_velocity);
        let q = UnitQuaternion::from_scaled_axis(omega * dt) * q3;
        UnitQuaternion::new_normalize(q.into_inner())
    }
}

fn clamp_norm(v: Vector3<f64>, max: f64) -> Vector3<f64> {
    let norm = v.norm();
    if norm > max && norm > 0.0 {
        v * (max / norm)
    } else {
        v
    }
}
