//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::ClientConfig;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    output_latency_s: f64,
    maximum_prediction_s: f64,
    connection_timeout_ms: u64,
    lightweight_segment_data: bool,
    subject_filter: Vec<String>,
    history_max_samples: usize,
    inbox_capacity: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    output_latency_s: config.output_latency_s,
                    maximum_prediction_s: config.maximum_prediction_s,
                    connection_timeout_ms: config.connection_timeout_ms,
                    lightweight_segment_data: config.lightweight_segment_data,
                    subject_filter: config.subject_filter.iter().map(|n| n.to_string()).collect(),
                    history_max_samples: config.history.max_samples,
                    inbox_capacity: config.inbox.capacity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ClientConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.output_latency_s < 0.0 {
        warnings.push(format!(
            "output_latency_s is negative ({}) - every query extrapolates past the newest sample",
            config.output_latency_s
        ));
    }

    if config.maximum_prediction_s == 0.0 {
        warnings.push(
            "maximum_prediction_s is 0 - queries past the newest sample are clamped".to_string(),
        );
    }

    // history must cover latency + prediction at a typical capture rate
    let horizon_s = config.output_latency_s.max(0.0)
        + config.maximum_prediction_s
        + config.history.jitter_margin_s;
    let needed = (horizon_s * 240.0).ceil() as usize;
    if config.history.max_samples < needed {
        warnings.push(format!(
            "history.max_samples = {} may not cover {:.3}s of history at 240 Hz",
            config.history.max_samples, horizon_s
        ));
    }

    if config.timing_log.client_log.is_some() || config.timing_log.stream_log.is_some() {
        warnings.push("timing logs are enabled - expect extra disk IO per frame".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Output latency: {}s", summary.output_latency_s);
            println!("  Maximum prediction: {}s", summary.maximum_prediction_s);
            println!("  Connection timeout: {}ms", summary.connection_timeout_ms);
            println!("  Lightweight segment data: {}", summary.lightweight_segment_data);
            if summary.subject_filter.is_empty() {
                println!("  Subject filter: (all subjects)");
            } else {
                println!("  Subject filter: {:?}", summary.subject_filter);
            }
            println!("  History samples: {}", summary.history_max_samples);
            println!("  Inbox capacity: {}", summary.inbox_capacity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_summary() {
        let file = write_config("output_latency_s = 0.03\nsubject_filter = [\"Alice\"]\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.output_latency_s, 0.03);
        assert_eq!(summary.subject_filter, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let file = write_config("[history]\nmax_samples = 1\n");
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("max_samples"));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&ValidateArgs {
            config: "/nonexistent/config.toml".into(),
            json: false,
        });
        assert!(!result.valid);
    }

    #[test]
    fn test_warnings() {
        let config = ClientConfig {
            output_latency_s: -0.01,
            maximum_prediction_s: 0.0,
            ..Default::default()
        };
        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 2);
        assert!(collect_warnings(&ClientConfig::default()).is_empty());
    }
}
