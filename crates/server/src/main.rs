//! csvgate server binary.

use anyhow::{Context, Result};
use clap::Parser;
use csvgate_core::config::AppConfig;
use csvgate_query::DuckDbExecutor;
use csvgate_server::{AppState, create_router};
use csvgate_storage::ArtifactStore;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// csvgate - cached CSV exports of DuckDB tables and views over HTTP
#[derive(Parser, Debug)]
#[command(name = "csvgated")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CSVGATE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional file, then `CSVGATE_*` environment variables.
fn load_config(path: &str) -> Result<(AppConfig, bool)> {
    let mut figment = Figment::new();
    let has_config_file = std::path::Path::new(path).exists();
    if has_config_file {
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CSVGATE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    Ok((config, has_config_file))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Every field has a default, so a missing file is not an error
    let (config, has_config_file) = load_config(&args.config)?;

    // Initialize tracing (keep the guard so the log file is flushed on exit)
    let _log_guard = csvgate_server::logging::init_tracing(&config.log)
        .context("failed to initialize logging")?;

    // Startup banner
    tracing::info!("csvgate v{}", env!("CARGO_PKG_VERSION"));
    if has_config_file {
        tracing::info!(config_path = %args.config, "Loaded configuration from file");
    } else {
        tracing::info!(
            config_path = %args.config,
            "No config file found, using defaults and environment variables"
        );
    }

    config.validate().context("invalid configuration")?;

    // Register Prometheus metrics
    csvgate_server::metrics::register_metrics();

    // Open the cache directory
    let store = ArtifactStore::new(&config.cache.dir)
        .await
        .with_context(|| format!("failed to open cache dir {}", config.cache.dir.display()))?;
    store
        .health_check()
        .await
        .context("cache directory health check failed")?;

    // No regeneration is in flight yet, so every temp file is an orphan
    let swept = store
        .sweep_temp_files(Duration::ZERO)
        .await
        .context("failed to sweep orphaned temp files")?;
    if swept > 0 {
        tracing::warn!(count = swept, "Removed orphaned temp files from a previous run");
    }
    tracing::info!(
        cache_dir = %config.cache.dir.display(),
        ttl_minutes = config.cache.ttl_minutes,
        key_policy = ?config.cache.key_policy,
        "Cache store ready"
    );

    if !config.database.path.is_file() {
        tracing::warn!(
            path = %config.database.path.display(),
            "Local database file not found; requests without a token will fail until it exists"
        );
    }
    let executor = Arc::new(DuckDbExecutor::new(&config.database));

    // Create application state and router
    let state = AppState::new(config.clone(), store, executor);
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
