//! Error handling for the HyperCube CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("HyperCube client error: {0}")]
    Client(#[from] hypercube_core::HyperCubeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading failed: {0}")]
    ConfigLoading(#[from] Box<figment::Error>),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        CliError::ConfigLoading(Box::new(err))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
