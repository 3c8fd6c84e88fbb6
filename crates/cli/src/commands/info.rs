//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{AxisMapping, ClientConfig};
use retiming_client::RetimingClient;

use super::load_config;
use crate::cli::InfoArgs;

/// Effective configuration for JSON output
#[derive(Serialize)]
struct ClientInfo {
    version: String,
    config_path: Option<String>,
    #[serde(flatten)]
    config: ClientConfig,
    /// Samples kept per segment, before the hard cap
    retention_s: f64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    if let Some(path) = &args.config {
        info!(config = %path.display(), "Loading configuration info");
    }

    let config = load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if args.json {
        let info = ClientInfo {
            version: RetimingClient::version().to_string(),
            config_path: args.config.as_ref().map(|p| p.display().to_string()),
            retention_s: retention_s(&config),
            config,
        };
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize client info")?;
        println!("{}", json);
    } else {
        print_client_info(&config, args);
    }

    Ok(())
}

/// History window each segment keeps
fn retention_s(config: &ClientConfig) -> f64 {
    config.output_latency_s.max(0.0)
        + config.maximum_prediction_s.max(0.0)
        + config.history.jitter_margin_s
}

fn describe_axes(mapping: &AxisMapping) -> String {
    if mapping.is_identity() {
        "identity (+x, +y, +z)".to_string()
    } else {
        format!("X={:?}, Y={:?}, Z={:?}", mapping.x, mapping.y, mapping.z)
    }
}

fn print_client_info(config: &ClientConfig, args: &InfoArgs) {
    println!("=== Retiming Client v{} ===\n", RetimingClient::version());

    match &args.config {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: (defaults)"),
    }

    println!("\nTiming");
    println!("  Output latency: {}s", config.output_latency_s);
    println!("  Maximum prediction: {}s", config.maximum_prediction_s);
    println!("  Connection timeout: {}ms", config.connection_timeout_ms);
    println!("  Retention window: {:.3}s", retention_s(config));

    println!("\nOutput");
    println!("  Axis mapping: {}", describe_axes(&config.axis_mapping));
    println!("  Lightweight segment data: {}", config.lightweight_segment_data);
    if config.subject_filter.is_empty() {
        println!("  Subject filter: (all subjects)");
    } else {
        let names: Vec<String> = config.subject_filter.iter().map(|n| n.to_string()).collect();
        println!("  Subject filter: {}", names.join(", "));
    }

    println!("\nHistory");
    println!("  Max samples per segment: {}", config.history.max_samples);
    println!("  Jitter margin: {}s", config.history.jitter_margin_s);

    println!("\nPrediction limits");
    println!("  Linear velocity: {} mm/s", config.prediction.max_linear_velocity);
    println!(
        "  Linear acceleration: {} mm/s²",
        config.prediction.max_linear_acceleration
    );
    println!("  Angular velocity: {:.3} rad/s", config.prediction.max_angular_velocity);

    println!("\nInbox");
    println!("  Capacity: {}", config.inbox.capacity);
    println!("  Drop policy: {:?}", config.inbox.drop_policy);

    let logs = &config.timing_log;
    if logs.client_log.is_some() || logs.stream_log.is_some() {
        println!("\nTiming logs");
        if let Some(path) = &logs.client_log {
            println!("  Client: {}", path.display());
        }
        if let Some(path) = &logs.stream_log {
            println!("  Stream: {}", path.display());
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_ignores_negative_latency() {
        let config = ClientConfig {
            output_latency_s: -0.5,
            ..Default::default()
        };
        assert!((retention_s(&config) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_info_json_flattens_config() {
        let config = ClientConfig::default();
        let info = ClientInfo {
            version: "0.1.0".into(),
            config_path: None,
            retention_s: retention_s(&config),
            config,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["output_latency_s"], 0.02);
        assert_eq!(value["inbox"]["capacity"], 256);
        assert_eq!(value["version"], "0.1.0");
    }
}
