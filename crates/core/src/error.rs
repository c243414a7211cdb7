//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid path component: {0}")]
    InvalidPath(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
