//! Error types for Goftar

use thiserror::Error;

/// Main error type for Goftar operations
#[derive(Error, Debug)]
pub enum GoftarError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session/auth errors (cookie signing, token handling)
    #[error("Auth error: {0}")]
    Auth(String),

    /// Upstream API errors
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Relay/HTTP server errors
    #[error("Relay error: {0}")]
    Relay(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Result type alias for Goftar operations
pub type Result<T> = std::result::Result<T, GoftarError>;
