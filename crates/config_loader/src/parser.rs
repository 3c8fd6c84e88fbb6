//! Configuration parsing
//!
//! TOML is the primary format; JSON is accepted as well.

use contracts::{ClientConfig, ContractError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<ClientConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<ClientConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<ClientConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AxisDirection, DropPolicy};

    #[test]
    fn test_parse_toml_partial_uses_defaults() {
        let content = r#"
output_latency_s = 0.03
subject_filter = ["Actor"]

[axis_mapping]
x = "+x"
y = "+z"
z = "-y"

[inbox]
drop_policy = "drop_newest"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.output_latency_s, 0.03);
        assert_eq!(config.maximum_prediction_s, 0.1);
        assert_eq!(config.subject_filter.len(), 1);
        assert_eq!(config.axis_mapping.y, AxisDirection::PosZ);
        assert_eq!(config.axis_mapping.z, AxisDirection::NegY);
        assert_eq!(config.inbox.drop_policy, DropPolicy::DropNewest);
        assert_eq!(config.inbox.capacity, 256);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "maximum_prediction_s": 0.05,
            "history": { "max_samples": 64 },
            "timing_log": { "client_log": "client.jsonl" }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.maximum_prediction_s, 0.05);
        assert_eq!(config.history.max_samples, 64);
        assert!(config.timing_log.client_log.is_some());
        assert!(config.timing_log.stream_log.is_none());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(
            result.unwrap_err(),
            ContractError::ConfigParse { .. }
        ));
    }

    #[test]
    fn test_unknown_axis_direction() {
        let result = parse_toml("[axis_mapping]\nx = \"+w\"\ny = \"+y\"\nz = \"+z\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("JSON"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
