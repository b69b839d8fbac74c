//! The session authentication engine.
//!
//! Owns everything the connection state machine needs for the
//! `Authenticating` stage: nonce issuance with a freshness window,
//! challenge verification for registered and first-contact users,
//! password verification, and second-factor generation plus bounded
//! delivery retries.

use crate::mailer::SecondFactorSender;
use corral_catalog::{CatalogError, PasswordVerdict, UserRegistry};
use corral_core::config::{AuthConfig, AuthMode, TwoFactorConfig};
use corral_signer::{challenge, PublicKey};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Authentication-engine errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("second-factor delivery failed after {0} attempts")]
    SecondFactorDelivery(u32),
}

/// An issued challenge nonce with its issuance time.
#[derive(Debug)]
pub struct IssuedChallenge {
    pub nonce: u64,
    issued: Instant,
}

/// Session authentication engine.
pub struct AuthEngine {
    users: Arc<UserRegistry>,
    mode: AuthMode,
    nonce_ttl: Duration,
    two_factor: TwoFactorConfig,
    mailer: Option<Arc<dyn SecondFactorSender>>,
}

impl AuthEngine {
    /// Build the engine.
    pub fn new(
        users: Arc<UserRegistry>,
        auth: &AuthConfig,
        two_factor: TwoFactorConfig,
        mailer: Option<Arc<dyn SecondFactorSender>>,
    ) -> Self {
        Self {
            users,
            mode: auth.mode,
            nonce_ttl: auth.nonce_ttl(),
            two_factor,
            mailer,
        }
    }

    /// Configured primary authentication mode.
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Whether a second factor is required after primary auth.
    pub fn second_factor_required(&self) -> bool {
        self.two_factor.enabled && self.mailer.is_some()
    }

    /// Whether the user id names a known identity.
    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.users.is_registered(user_id).await
    }

    /// Password-mode primary authentication.
    pub async fn authenticate_password(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<PasswordVerdict, AuthError> {
        Ok(self.users.authenticate_password(user_id, password).await?)
    }

    /// Issue a fresh challenge nonce.
    pub fn issue_challenge(&self) -> IssuedChallenge {
        IssuedChallenge {
            nonce: challenge::generate_nonce(),
            issued: Instant::now(),
        }
    }

    /// Whether a challenge response arrived inside the freshness
    /// window.
    pub fn is_fresh(&self, issued: &IssuedChallenge) -> bool {
        issued.issued.elapsed() <= self.nonce_ttl
    }

    /// Verify a registered user's signature over the issued nonce
    /// against the certificate on file. Any mismatch — unknown
    /// certificate, unparsable key, bad signature — is a plain `false`;
    /// the caller reports `WRONG_NONCE` and closes.
    pub async fn verify_registered(&self, user_id: &str, nonce: u64, signature: &str) -> bool {
        let Some(stored) = self.users.certificate(user_id).await else {
            return false;
        };
        let public = match PublicKey::from_text(&stored) {
            Ok(key) => key,
            Err(e) => {
                warn!(user = %user_id, error = %e, "stored certificate unparsable");
                return false;
            }
        };
        challenge::verify_nonce_signature(&public, nonce, signature).is_ok()
    }

    /// First-contact verification: check the signature against the
    /// presented certificate and, on success, bind that certificate to
    /// the new id for all future sessions.
    pub async fn verify_and_bind_first_contact(
        &self,
        user_id: &str,
        nonce: u64,
        signature: &str,
        certificate: &str,
    ) -> Result<bool, AuthError> {
        let public = match PublicKey::from_text(certificate) {
            Ok(key) => key,
            Err(_) => return Ok(false),
        };
        if challenge::verify_nonce_signature(&public, nonce, signature).is_err() {
            return Ok(false);
        }
        // A concurrent connection may have claimed the id; first
        // binding wins and this attempt fails.
        Ok(self.users.bind_certificate(user_id, certificate).await?)
    }

    /// Generate a second-factor code and deliver it, retrying with a
    /// fresh code up to the configured attempt limit.
    pub async fn deliver_second_factor(&self, user_id: &str) -> Result<u32, AuthError> {
        let Some(mailer) = &self.mailer else {
            return Err(AuthError::SecondFactorDelivery(0));
        };

        let attempts = self.two_factor.max_attempts.max(1);
        for attempt in 1..=attempts {
            let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
            match mailer.send_code(user_id, code).await {
                Ok(()) => return Ok(code),
                Err(e) => {
                    warn!(user = %user_id, attempt, error = %e, "second-factor delivery failed");
                }
            }
        }
        Err(AuthError::SecondFactorDelivery(attempts))
    }
}
