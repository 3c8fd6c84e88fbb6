//! Client configuration contracts shared by the loader, the client and the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::{AxisMapping, Name};

pub const DEFAULT_OUTPUT_LATENCY_S: f64 = 0.02;
pub const DEFAULT_MAXIMUM_PREDICTION_S: f64 = 0.1;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Retiming client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientConfig {
    /// Delay applied to the query time (seconds, may be negative)
    pub output_latency_s: f64,

    /// Ceiling on extrapolation past the newest sample (seconds)
    #[validate(range(min = 0.0))]
    pub maximum_prediction_s: f64,

    /// Connect / wait-for-frame timeout
    #[validate(range(min = 1))]
    pub connection_timeout_ms: u64,

    /// Output coordinate frame
    pub axis_mapping: AxisMapping,

    /// Quantise segment data at ingestion
    pub lightweight_segment_data: bool,

    /// Subjects to retime; empty means all
    pub subject_filter: Vec<Name>,

    #[validate(nested)]
    pub history: HistoryConfig,

    #[validate(nested)]
    pub prediction: PredictionConfig,

    #[validate(nested)]
    pub inbox: InboxConfig,

    pub timing_log: TimingLogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_latency_s: DEFAULT_OUTPUT_LATENCY_S,
            maximum_prediction_s: DEFAULT_MAXIMUM_PREDICTION_S,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            axis_mapping: AxisMapping::default(),
            lightweight_segment_data: false,
            subject_filter: Vec::new(),
            history: HistoryConfig::default(),
            prediction: PredictionConfig::default(),
            inbox: InboxConfig::default(),
            timing_log: TimingLogConfig::default(),
        }
    }
}

/// Per-segment history retention
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    /// Hard cap on stored samples per segment
    #[validate(range(min = 3))]
    pub max_samples: usize,

    /// Extra retention beyond latency + prediction (seconds)
    #[validate(range(min = 0.0))]
    pub jitter_margin_s: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_samples: 512,
            jitter_margin_s: 0.05,
        }
    }
}

/// Extrapolation bounds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PredictionConfig {
    /// mm/s
    #[validate(range(min = 0.0))]
    pub max_linear_velocity: f64,

    /// mm/s²
    #[validate(range(min = 0.0))]
    pub max_linear_acceleration: f64,

    /// rad/s
    #[validate(range(min = 0.0))]
    pub max_angular_velocity: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_linear_velocity: 10_000.0,
            max_linear_acceleration: 100_000.0,
            max_angular_velocity: 4.0 * std::f64::consts::PI,
        }
    }
}

/// Raw event queue between the transport thread and the update cycle
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InboxConfig {
    #[validate(range(min = 1))]
    pub capacity: usize,

    pub drop_policy: DropPolicy,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            drop_policy: DropPolicy::DropOldest,
        }
    }
}

/// What to do with a frame when the inbox is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Discard the oldest queued frame
    #[default]
    DropOldest,
    /// Discard the incoming frame
    DropNewest,
}

/// JSON-lines timing logs; `None` disables a log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingLogConfig {
    /// One record per update cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_log: Option<PathBuf>,

    /// One record per received transport frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_latency_s, 0.02);
        assert_eq!(config.maximum_prediction_s, 0.1);
        assert!(config.axis_mapping.is_identity());
    }

    #[test]
    fn test_negative_prediction_is_invalid() {
        let config = ClientConfig {
            maximum_prediction_s: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_rules_apply() {
        let mut config = ClientConfig::default();
        config.history.max_samples = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"output_latency_s": 0.0, "inbox": {"drop_policy": "drop_newest"}}"#)
                .unwrap();
        assert_eq!(config.output_latency_s, 0.0);
        assert_eq!(config.inbox.drop_policy, DropPolicy::DropNewest);
        assert_eq!(config.inbox.capacity, 256);
        assert_eq!(config.connection_timeout_ms, 5000);
    }
}
