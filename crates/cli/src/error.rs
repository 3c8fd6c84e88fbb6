//! Error types for CLI operations.

use contracts::ContractError;
use retiming_client::RetimingError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[source] ContractError),

    /// Frame source could not be built
    #[error("Failed to open frame source: {0}")]
    Source(#[source] ContractError),

    /// Retiming client error
    #[error(transparent)]
    Client(#[from] RetimingError),

    /// Streaming session thread failed
    #[error("Session failed: {message}")]
    Session { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
