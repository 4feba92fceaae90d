//! Error types for CDP

use thiserror::Error;

/// Result type alias for CDP operations
pub type Result<T> = std::result::Result<T, CdpError>;

/// Main error type for CDP
#[derive(Error, Debug)]
pub enum CdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
