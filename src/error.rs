//! Error types for the simulation core.
//!
//! Fatal conditions abort a run and surface here. Non-fatal conditions are
//! recorded as [`crate::types::Diagnostic`] entries and the run continues.

use thiserror::Error;

/// Fatal errors for the simulation core.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Panel error: {0}")]
    PanelError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Empty panel")]
    EmptyPanel,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
