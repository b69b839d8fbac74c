//! Corral server binary.

use anyhow::{Context, Result};
use clap::Parser;
use corral_core::config::AppConfig;
use corral_server::{session, tls, AppState};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Corral - a multi-tenant IoT fleet-management server
#[derive(Parser, Debug)]
#[command(name = "corrald")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CORRAL_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Corral v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide or
    // override everything).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("no config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CORRAL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let bind = config.server.bind.clone();
    let acceptor = tls::build_acceptor(config.tls.as_ref())?;
    if acceptor.is_some() {
        tracing::info!("TLS enabled");
    } else {
        tracing::warn!("TLS not configured, listener speaks plain TCP");
    }

    let state = AppState::initialize(config)
        .await
        .context("failed to initialize server state")?;
    tracing::info!("catalogs loaded");

    let _sweeper = session::spawn_sweeper(state.clone());
    tracing::info!(
        interval_secs = state.config.session.sweep_interval_secs,
        idle_secs = state.config.session.idle_timeout_secs,
        "session sweeper spawned"
    );

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    tracing::info!("listening on {bind}");

    corral_server::serve(listener, acceptor, state).await?;
    Ok(())
}
