//! Vault upload server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_core::config::AppConfig;
use vault_server::bootstrap::ensure_admin_token;
use vault_server::sweep::spawn_sweep_task;
use vault_server::{AppState, create_router};

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "VAULT_";

/// vaultd - chunked upload server for the vault
#[derive(Parser, Debug)]
#[command(name = "vaultd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VAULT_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `VAULT_`
/// environment variables (`VAULT_UPLOAD__CHUNK_SIZE=...`).
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("vaultd v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    vault_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = vault_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    // Fail fast instead of reporting healthy with unreachable storage.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = vault_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let state = AppState::new(config.clone(), storage, metadata).map_err(anyhow::Error::msg)?;

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        vault_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    if config.gc.enabled {
        spawn_sweep_task(state.coordinator.clone(), config.gc.clone());
        tracing::info!(interval_secs = config.gc.interval_secs, "Expiry sweep scheduled");
    } else {
        tracing::info!("Background expiry sweep disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds client IPs to the rate limiter.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
