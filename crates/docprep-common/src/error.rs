//! Error types for docprep

use thiserror::Error;

/// Result type alias for docprep operations
pub type Result<T> = std::result::Result<T, DocprepError>;

/// Main error type for docprep
#[derive(Error, Debug)]
pub enum DocprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid link: {0}")]
    InvalidLink(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
