//! Client attestation digest.
//!
//! Before the command loop opens, the client proves it runs the
//! known-good executable by hashing its own binary together with a
//! server-issued nonce. The server computes the same digest from its
//! reference copy; binding the nonce into the hash keeps a recorded
//! digest from being replayed on a later connection.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the attestation digest: SHA-256 over the executable bytes
/// followed by the nonce as 8 big-endian bytes. Returned base64-encoded
/// for transport.
pub fn attestation_digest(executable: &[u8], nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(executable);
    hasher.update(nonce.to_be_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_nonce_bound() {
        let exe = b"#!/bin/fleet-client";
        assert_eq!(attestation_digest(exe, 7), attestation_digest(exe, 7));
        assert_ne!(attestation_digest(exe, 7), attestation_digest(exe, 8));
    }

    #[test]
    fn digest_is_content_bound() {
        assert_ne!(
            attestation_digest(b"client-v1", 7),
            attestation_digest(b"client-v2", 7)
        );
    }
}
