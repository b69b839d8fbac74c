//! Application state shared across connection workers.

use crate::attest::AttestVerifier;
use crate::auth::AuthEngine;
use crate::mailer::{HttpMailer, SecondFactorSender};
use crate::session::SessionTracker;
use anyhow::{Context, Result};
use corral_catalog::FleetManager;
use corral_core::config::AppConfig;
use std::sync::Arc;

/// Shared server state. Cloning is cheap; every field is behind an
/// `Arc`. There are no globals: the state is constructed once at
/// startup and handed to each connection worker.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// The catalogs and image store.
    pub fleet: Arc<FleetManager>,
    /// The authentication engine.
    pub auth: Arc<AuthEngine>,
    /// Active-session timestamps.
    pub sessions: Arc<SessionTracker>,
    /// Attestation verifier.
    pub attest: Arc<AttestVerifier>,
}

impl AppState {
    /// Initialize state from configuration: load catalogs, the
    /// attestation reference, and the production mail gateway.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let mailer: Option<Arc<dyn SecondFactorSender>> = if config.two_factor.enabled {
            let gateway_url = config
                .two_factor
                .gateway_url
                .clone()
                .context("two_factor.enabled requires two_factor.gateway_url")?;
            let api_key = config
                .two_factor
                .api_key
                .clone()
                .context("two_factor.enabled requires two_factor.api_key")?;
            Some(Arc::new(HttpMailer::new(gateway_url, api_key)))
        } else {
            None
        };

        Self::with_mailer(config, mailer).await
    }

    /// Initialize state with an explicit mailer (tests inject a
    /// recording mailer here).
    pub async fn with_mailer(
        config: AppConfig,
        mailer: Option<Arc<dyn SecondFactorSender>>,
    ) -> Result<Self> {
        let fleet = Arc::new(
            FleetManager::open(&config.storage)
                .await
                .context("failed to open catalogs")?,
        );
        let attest = Arc::new(
            AttestVerifier::from_config(&config.attestation)
                .await
                .context("failed to load attestation reference")?,
        );
        let auth = Arc::new(AuthEngine::new(
            fleet.users().clone(),
            &config.auth,
            config.two_factor.clone(),
            mailer,
        ));

        Ok(Self {
            config: Arc::new(config),
            fleet,
            auth,
            sessions: Arc::new(SessionTracker::new()),
            attest,
        })
    }
}
