//! Catalog error types.

use thiserror::Error;

/// Errors from catalog persistence and credential handling.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot {file}: {detail}")]
    Corrupt { file: String, detail: String },

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("invalid image name: {0}")]
    InvalidImageName(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
