//! Configuration validation
//!
//! Rules:
//! - derive rules on the config structs (`validator`)
//! - all tunables finite
//! - axis mapping uses three distinct axes and is right-handed
//! - subject filter names non-empty and unique

use std::collections::HashSet;

use contracts::{ClientConfig, ContractError};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a parsed configuration.
///
/// Returns the first error found, or Ok(()).
pub fn validate(config: &ClientConfig) -> Result<(), ContractError> {
    validate_derived(config)?;
    validate_finite(config)?;
    validate_axis_mapping(config)?;
    validate_subject_filter(config)?;
    Ok(())
}

fn validate_derived(config: &ClientConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };
    let mut failures = Vec::new();
    flatten("", &errors, &mut failures);
    failures.sort();
    let (field, message) = failures
        .into_iter()
        .next()
        .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
    Err(ContractError::config_validation(field, message))
}

/// Collect `(path, message)` pairs from nested validation errors
fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let message = match &failure.message {
                        Some(message) => message.to_string(),
                        None => {
                            let mut params: Vec<String> = failure
                                .params
                                .iter()
                                .map(|(k, v)| format!("{k} = {v}"))
                                .collect();
                            params.sort();
                            format!("failed '{}' check ({})", failure.code, params.join(", "))
                        }
                    };
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}

fn validate_finite(config: &ClientConfig) -> Result<(), ContractError> {
    let values = [
        ("output_latency_s", config.output_latency_s),
        ("maximum_prediction_s", config.maximum_prediction_s),
        ("history.jitter_margin_s", config.history.jitter_margin_s),
        (
            "prediction.max_linear_velocity",
            config.prediction.max_linear_velocity,
        ),
        (
            "prediction.max_linear_acceleration",
            config.prediction.max_linear_acceleration,
        ),
        (
            "prediction.max_angular_velocity",
            config.prediction.max_angular_velocity,
        ),
    ];
    for (field, value) in values {
        if !value.is_finite() {
            return Err(ContractError::config_validation(
                field,
                format!("must be finite, got {value}"),
            ));
        }
    }
    Ok(())
}

fn validate_axis_mapping(config: &ClientConfig) -> Result<(), ContractError> {
    config
        .axis_mapping
        .validate()
        .map_err(|e| ContractError::config_validation("axis_mapping", e.to_string()))
}

fn validate_subject_filter(config: &ClientConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, name) in config.subject_filter.iter().enumerate() {
        if name.is_empty() {
            return Err(ContractError::config_validation(
                format!("subject_filter[{idx}]"),
                "subject name cannot be empty",
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(ContractError::config_validation(
                format!("subject_filter[{idx}]"),
                format!("duplicate subject '{name}'"),
            ));
        }
    }
    Ok(())
}
