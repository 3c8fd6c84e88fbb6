//! Command implementations.

mod info;
mod run;
mod validate;

use std::path::Path;

use config_loader::ConfigLoader;
use contracts::ClientConfig;
use tracing::info;

use crate::error::{CliError, Result};

pub use info::run_info;
pub use run::run_client;
pub use validate::run_validate;

/// Load a configuration file, or the defaults when no path is given
pub(crate) fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(ClientConfig::default());
    };
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    ConfigLoader::load_from_path(path).map_err(CliError::Config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.output_latency_s, contracts::DEFAULT_OUTPUT_LATENCY_S);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/retiming.toml"))).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_config_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "maximum_prediction_s = -1.0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
