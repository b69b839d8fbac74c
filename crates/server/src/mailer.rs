//! Second-factor code delivery.
//!
//! Delivery is a trait so the engine can be tested without a mail
//! gateway. The production implementation calls an HTTP gateway that
//! emails the code to the user's address (the user id doubles as the
//! address in this deployment).

use async_trait::async_trait;
use thiserror::Error;

/// Delivery errors.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway refused delivery: http {0}")]
    Refused(u16),
}

/// Sends second-factor codes out of band.
#[async_trait]
pub trait SecondFactorSender: Send + Sync {
    /// Deliver `code` to the user. Ok means the gateway accepted it.
    async fn send_code(&self, user_id: &str, code: u32) -> Result<(), MailerError>;
}

/// HTTP mail gateway client.
pub struct HttpMailer {
    http: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl HttpMailer {
    /// Create a gateway client.
    pub fn new(gateway_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            gateway_url: gateway_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SecondFactorSender for HttpMailer {
    async fn send_code(&self, user_id: &str, code: u32) -> Result<(), MailerError> {
        let code = code.to_string();
        let response = self
            .http
            .get(&self.gateway_url)
            .query(&[("e", user_id), ("c", code.as_str()), ("a", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailerError::Refused(status.as_u16()));
        }
        Ok(())
    }
}
