//! CLI error type.

use abrshim::abr::LadderError;
use abrshim::config::ConfigError;
use abrshim::coordinator::CoordinatorError;
use abrshim::intercept::NetworkError;
use abrshim::logging::LoggingError;
use abrshim::orchestrator::OrchestratorError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session failed: {0}")]
    Session(#[from] OrchestratorError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LadderError> for CliError {
    fn from(e: LadderError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl CliError {
    /// Process exit status for this error. Usage problems exit with 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}
