//! Client attestation.
//!
//! The server holds a reference copy of the known-good client
//! executable and recomputes the nonce-bound digest the client reports.
//! When no reference is configured every attestation fails, which under
//! the default fatal policy refuses all clients; the misconfiguration
//! is logged loudly at startup.

use corral_core::config::AttestationConfig;
use corral_signer::attestation_digest;
use tracing::warn;

/// Verifies attestation digests against the reference executable.
pub struct AttestVerifier {
    reference: Option<Vec<u8>>,
    fatal: bool,
}

impl AttestVerifier {
    /// Load the reference executable named in the configuration.
    pub async fn from_config(config: &AttestationConfig) -> std::io::Result<Self> {
        let reference = match &config.reference {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => {
                warn!("no attestation reference configured; every attestation will fail");
                None
            }
        };
        Ok(Self {
            reference,
            fatal: config.fatal,
        })
    }

    /// Build a verifier from in-memory reference bytes.
    pub fn from_bytes(reference: Vec<u8>, fatal: bool) -> Self {
        Self {
            reference: Some(reference),
            fatal,
        }
    }

    /// Whether a failed attestation closes the connection.
    pub fn fatal(&self) -> bool {
        self.fatal
    }

    /// Check a reported digest for the given nonce.
    pub fn verify(&self, digest_b64: &str, nonce: u64) -> bool {
        match &self.reference {
            Some(bytes) => attestation_digest(bytes, nonce) == digest_b64,
            None => false,
        }
    }
}
