//! Signing primitives for Corral authentication.
//!
//! Covers the three cryptographic jobs of the fleet server: ed25519
//! key handling, nonce challenge-response signing and verification, and
//! the client attestation digest.

pub mod attest;
pub mod challenge;
pub mod error;
pub mod key;

pub use attest::attestation_digest;
pub use challenge::{generate_nonce, sign_nonce, verify_nonce_signature};
pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey};
