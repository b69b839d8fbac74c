//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// TLS settings. When absent the listener speaks plain TCP
    /// (development and tests only).
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Catalog and image persistence locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Client attestation settings.
    #[serde(default)]
    pub attestation: AttestationConfig,
    /// Session timeout settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Second-factor delivery settings.
    #[serde(default)]
    pub two_factor: TwoFactorConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in a scratch directory:
    /// plain TCP on an ephemeral port, certificate auth, no second
    /// factor, advisory-free defaults everywhere else.
    ///
    /// **For testing only.**
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                ..ServerConfig::default()
            },
            storage: StorageConfig {
                data_dir: data_dir.into(),
            },
            ..Self::default()
        }
    }
}

/// Listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5757").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted binary payload size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// TLS listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert: PathBuf,
    /// PEM private key path.
    pub key: PathBuf,
}

/// Persistence locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for snapshots and images.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Users snapshot file.
    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.txt")
    }

    /// Devices snapshot file.
    pub fn devices_file(&self) -> PathBuf {
        self.data_dir.join("devices.txt")
    }

    /// Domains snapshot file.
    pub fn domains_file(&self) -> PathBuf {
        self.data_dir.join("domains.txt")
    }

    /// Image directory.
    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join("img")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Primary authentication mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Nonce challenge-response against a stored or presented
    /// certificate (default).
    #[default]
    Certificate,
    /// Stored password hash.
    Password,
}

/// Authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Primary authentication mode.
    #[serde(default)]
    pub mode: AuthMode,
    /// Challenge responses older than this are rejected as replays.
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,
}

impl AuthConfig {
    /// Nonce freshness window as a Duration.
    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            nonce_ttl_secs: default_nonce_ttl_secs(),
        }
    }
}

/// Client attestation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationConfig {
    /// Known-good client executable. Attestation digests are computed
    /// over these bytes; when unset every attestation fails.
    #[serde(default)]
    pub reference: Option<PathBuf>,
    /// Whether attestation failure closes the connection (default) or
    /// is merely logged.
    #[serde(default = "default_true")]
    pub fatal: bool,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            reference: None,
            fatal: default_true(),
        }
    }
}

/// Session sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sweeper wake interval in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Idle threshold beyond which a session is evicted, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    /// Sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Idle threshold as a Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Second-factor delivery configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TwoFactorConfig {
    /// Whether a second factor is required after primary auth.
    #[serde(default)]
    pub enabled: bool,
    /// Mail gateway endpoint.
    #[serde(default)]
    pub gateway_url: Option<String>,
    /// Mail gateway API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Maximum generate-and-send attempts before auth fails.
    #[serde(default = "default_two_factor_attempts")]
    pub max_attempts: u32,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: None,
            api_key: None,
            max_attempts: default_two_factor_attempts(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5757".to_string()
}

fn default_max_payload_bytes() -> u64 {
    crate::wire::DEFAULT_MAX_PAYLOAD
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_nonce_ttl_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_two_factor_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5757");
        assert_eq!(config.auth.mode, AuthMode::Certificate);
        assert!(config.attestation.fatal);
        assert!(!config.two_factor.enabled);
        assert_eq!(config.session.idle_timeout_secs, 60);
    }

    #[test]
    fn storage_paths_derive_from_data_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/srv/corral"),
        };
        assert_eq!(storage.users_file(), PathBuf::from("/srv/corral/users.txt"));
        assert_eq!(storage.image_dir(), PathBuf::from("/srv/corral/img"));
    }

    #[test]
    fn auth_mode_spelling() {
        let auth: AuthConfig = serde_json::from_str(r#"{"mode":"password"}"#).unwrap();
        assert_eq!(auth.mode, AuthMode::Password);
    }
}
