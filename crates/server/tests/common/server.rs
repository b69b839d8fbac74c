//! In-process server fixture.

use corral_core::config::{AppConfig, AuthMode};
use corral_server::mailer::SecondFactorSender;
use corral_server::{session, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;

/// Default reference executable bytes used by test clients.
pub const REFERENCE_EXECUTABLE: &[u8] = b"corral-test-client-v1";

/// A test server listening on an ephemeral local port.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Fixture options.
pub struct TestServerBuilder {
    auth_mode: AuthMode,
    attestation_fatal: bool,
    mailer: Option<Arc<dyn SecondFactorSender>>,
    sweep_secs: Option<(u64, u64)>,
}

#[allow(dead_code)]
impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            auth_mode: AuthMode::Certificate,
            attestation_fatal: true,
            mailer: None,
            sweep_secs: None,
        }
    }

    pub fn password_mode(mut self) -> Self {
        self.auth_mode = AuthMode::Password;
        self
    }

    pub fn advisory_attestation(mut self) -> Self {
        self.attestation_fatal = false;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn SecondFactorSender>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_sweeper(mut self, interval_secs: u64, idle_secs: u64) -> Self {
        self.sweep_secs = Some((interval_secs, idle_secs));
        self
    }

    pub async fn start(self) -> TestServer {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");

        let reference_path = temp_dir.path().join("reference-client");
        tokio::fs::write(&reference_path, REFERENCE_EXECUTABLE)
            .await
            .expect("failed to write attestation reference");

        let mut config = AppConfig::for_testing(temp_dir.path().join("data"));
        config.auth.mode = self.auth_mode;
        config.attestation.reference = Some(reference_path);
        config.attestation.fatal = self.attestation_fatal;
        config.two_factor.enabled = self.mailer.is_some();
        if let Some((interval, idle)) = self.sweep_secs {
            config.session.sweep_interval_secs = interval;
            config.session.idle_timeout_secs = idle;
        }

        let state = AppState::with_mailer(config, self.mailer)
            .await
            .expect("failed to initialize test state");

        if self.sweep_secs.is_some() {
            session::spawn_sweeper(state.clone());
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("no local addr");

        let serve_state = state.clone();
        tokio::spawn(async move {
            let _ = corral_server::serve(listener, None, serve_state).await;
        });

        TestServer {
            addr,
            state,
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a default certificate-mode test server.
#[allow(dead_code)]
pub async fn start_server() -> TestServer {
    TestServerBuilder::new().start().await
}
