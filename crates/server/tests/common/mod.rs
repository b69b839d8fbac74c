//! Common test utilities and fixtures.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::*;
#[allow(unused_imports)]
pub use server::*;

use async_trait::async_trait;
use corral_server::mailer::{MailerError, SecondFactorSender};
use std::sync::Mutex;

/// A mailer that records delivered codes instead of sending them.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingMailer {
    codes: Mutex<Vec<u32>>,
}

#[allow(dead_code)]
impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently delivered code.
    pub fn last_code(&self) -> Option<u32> {
        self.codes.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl SecondFactorSender for RecordingMailer {
    async fn send_code(&self, _user_id: &str, code: u32) -> Result<(), MailerError> {
        self.codes.lock().unwrap().push(code);
        Ok(())
    }
}
