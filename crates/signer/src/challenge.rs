//! Nonce challenge-response signing and verification.
//!
//! The server issues a random nonce per authentication attempt; the
//! client signs the nonce's big-endian bytes with its secret key and
//! the server verifies against the certificate on file (or, on first
//! contact, the presented one). A nonce is used exactly once, so a
//! captured signature cannot be replayed against a later challenge.

use crate::error::{SignerError, SignerResult};
use crate::key::{PublicKey, SecretKey};
use base64::Engine;
use ed25519_dalek::{Signer as _, Verifier as _};
use rand::Rng;

/// Generate a random challenge nonce.
pub fn generate_nonce() -> u64 {
    rand::thread_rng().gen()
}

/// Sign a nonce, returning the base64 signature.
pub fn sign_nonce(secret: &SecretKey, nonce: u64) -> String {
    let sig = secret.signing_key().sign(&nonce.to_be_bytes());
    base64::engine::general_purpose::STANDARD.encode(sig.to_bytes())
}

/// Verify a base64 signature over a nonce against a public key.
pub fn verify_nonce_signature(
    public: &PublicKey,
    nonce: u64,
    signature_b64: &str,
) -> SignerResult<()> {
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature_b64)
        .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;

    if sig_bytes.len() != 64 {
        return Err(SignerError::InvalidSignature(format!(
            "expected 64 bytes, got {}",
            sig_bytes.len()
        )));
    }

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| SignerError::InvalidSignature("invalid signature length".to_string()))?;

    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    public
        .verifying_key()
        .verify(&nonce.to_be_bytes(), &signature)
        .map_err(|_| SignerError::VerificationFailed)?;

    Ok(())
}
