//! Signer error types.

use thiserror::Error;

/// Errors from key handling and verification.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
