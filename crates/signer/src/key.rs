//! Ed25519 key types and operations.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;
use std::path::Path;

/// A secret (private) key for signing.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from the text format: base64(secret || public), 64 bytes.
    pub fn from_text(s: &str) -> SignerResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;

        if bytes.len() != 64 {
            return Err(SignerError::KeyParsing(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }

        let secret_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| SignerError::KeyParsing("invalid secret key bytes".to_string()))?;

        Ok(Self {
            inner: SigningKey::from_bytes(&secret_bytes),
        })
    }

    /// Encode as the text format: base64(secret || public).
    pub fn to_text(&self) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.inner.as_bytes());
        bytes.extend_from_slice(self.inner.verifying_key().as_bytes());
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Get the inner signing key.
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A public key for verification.
#[derive(Clone)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse from the text format: base64(public), 32 bytes.
    pub fn from_text(s: &str) -> SignerResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;

        if bytes.len() != 32 {
            return Err(SignerError::KeyParsing(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignerError::KeyParsing("invalid public key bytes".to_string()))?;

        let inner = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;

        Ok(Self { inner })
    }

    /// Encode as the text format: base64(public).
    pub fn to_text(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.inner.as_bytes())
    }

    /// Get the inner verifying key.
    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_text();
        write!(f, "PublicKey({}...)", &b64[..8])
    }
}

/// A key pair containing both secret and public keys.
pub struct KeyPair {
    /// The secret key.
    pub secret: SecretKey,
    /// The public key.
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Load a key pair from a single-line secret key file.
    pub fn load(path: impl AsRef<Path>) -> SignerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let secret = SecretKey::from_text(&text)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// Save the secret key to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> SignerResult<()> {
        std::fs::write(path, self.secret.to_text())?;
        Ok(())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_roundtrip() {
        let keypair = KeyPair::generate();
        let text = keypair.secret.to_text();

        let parsed = SecretKey::from_text(&text).unwrap();
        assert_eq!(
            parsed.public_key().to_text(),
            keypair.public.to_text()
        );
    }

    #[test]
    fn public_key_roundtrip() {
        let keypair = KeyPair::generate();
        let text = keypair.public.to_text();

        let parsed = PublicKey::from_text(&text).unwrap();
        assert_eq!(parsed.to_text(), keypair.public.to_text());
    }

    #[test]
    fn rejects_truncated_keys() {
        assert!(PublicKey::from_text("AAAA").is_err());
        assert!(SecretKey::from_text("AAAA").is_err());
        assert!(PublicKey::from_text("not base64 !!").is_err());
    }

    #[test]
    fn keypair_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");

        let keypair = KeyPair::generate();
        keypair.save(&path).unwrap();

        let loaded = KeyPair::load(&path).unwrap();
        assert_eq!(loaded.public.to_text(), keypair.public.to_text());
    }
}
