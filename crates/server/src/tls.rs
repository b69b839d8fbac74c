//! TLS listener setup.

use anyhow::{Context, Result};
use corral_core::config::TlsConfig;
use std::sync::Arc;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

/// Build the TLS acceptor, or `None` when TLS is unconfigured and the
/// listener speaks plain TCP.
pub fn build_acceptor(config: Option<&TlsConfig>) -> Result<Option<TlsAcceptor>> {
    let Some(tls) = config else {
        return Ok(None);
    };

    let cert_pem = std::fs::read(&tls.cert)
        .with_context(|| format!("failed to read TLS cert: {}", tls.cert.display()))?;
    let key_pem = std::fs::read(&tls.key)
        .with_context(|| format!("failed to read TLS key: {}", tls.key.display()))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to parse TLS certificates")?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .context("failed to parse TLS private key")?
        .context("no private key found in PEM file")?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS configuration")?;

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}
