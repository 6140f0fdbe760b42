use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boardroom::config::Config;
use boardroom::http::rate_limit::RateLimiter;
use boardroom::http::{router, AppState};
use boardroom::manager::{spawn_reaper, LobbyManager, SystemClock};
use boardroom::realtime;
use boardroom::realtime::hub::UpdateHub;
use boardroom::realtime::voice::VoiceRegistry;

#[derive(Parser)]
#[command(name = "boardroom")]
#[command(about = "Real-time multiplayer server for a stock-acquisition board game")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "boardroom.toml")]
    config: PathBuf,

    /// Server listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    info!("🏢 Boardroom server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&cli.config).await?;
    if let Some(listen) = cli.listen {
        config.server.bind_address = listen;
    }
    config.validate()?;

    let bind_address: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("Failed to parse listen address")?;

    // Wire the service graph: registry, voice tables, realtime layer, hub.
    let manager = Arc::new(LobbyManager::new(config.limits, Arc::new(SystemClock)));
    let voice = Arc::new(VoiceRegistry::new());
    let (socket_layer, io) = realtime::build(voice);
    let hub = UpdateHub::new(io);
    let state = AppState {
        manager: manager.clone(),
        hub: hub.clone(),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limiting.clone())),
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let reaper = spawn_reaper(manager, hub, shutdown_tx.subscribe());

    let app = router(state).layer(socket_layer);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!("🚀 Listening on {bind_address}");

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = serve_result {
        error!("Server error: {e}");
    }

    // Stop the background reaper and let its current pass finish.
    let _ = shutdown_tx.send(());
    if let Err(e) = reaper.await {
        warn!("Reaper task ended abnormally: {e}");
    }

    info!("👋 Boardroom shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("boardroom={level},tower_http=warn").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .init();
    Ok(())
}

/// Load the configuration file, writing a default one on first boot.
async fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        let config = Config::load(path)?;
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    } else {
        warn!("Configuration file not found: {}, using defaults", path.display());
        let mut config = Config::default();
        let config_str = toml::to_string_pretty(&config)?;
        tokio::fs::write(path, config_str).await?;
        info!("Created default configuration file: {}", path.display());
        config.apply_env_overrides();
        Ok(config)
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to create SIGINT handler: {e}");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to create SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received - initiating graceful shutdown"),
            _ = sigterm.recv() => info!("SIGTERM received - initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            return;
        }
        info!("Ctrl+C received - initiating graceful shutdown");
    }
}
