//! Rehearsal Player (rehearsal-player) - Main entry point
//!
//! Loads an optional session manifest into a mashup chain, starts the
//! playback engine against the in-process audio graph, and serves the
//! HTTP/SSE control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rehearsal_common::config::resolve_config_path;
use rehearsal_common::EventBus;
use rehearsal_player::api::{self, AppContext};
use rehearsal_player::config::{EngineConfig, APP_NAME, CONFIG_ENV_VAR};
use rehearsal_player::playback::{
    spawn_chain_driver, AudioGraph, ChainQueue, PlaybackEngine, VirtualGraph,
};
use rehearsal_player::session::SessionManifest;
use rehearsal_player::SharedState;

/// Command-line arguments for rehearsal-player
#[derive(Parser, Debug)]
#[command(name = "rehearsal-player")]
#[command(about = "Multitrack rehearsal playback engine")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5740", env = "REHEARSAL_PORT")]
    port: u16,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session manifest (JSON) listing the songs of a mashup chain
    #[arg(short, long, env = "REHEARSAL_SESSION")]
    session: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rehearsal_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting Rehearsal Player v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, APP_NAME);
    let config = EngineConfig::load(config_path.as_deref())
        .context("Failed to load engine configuration")?;

    let songs = match &args.session {
        Some(path) => SessionManifest::load(path)
            .and_then(SessionManifest::into_songs)
            .with_context(|| format!("Failed to load session {}", path.display()))?,
        None => Vec::new(),
    };
    info!("Session contains {} song(s)", songs.len());

    let events = EventBus::new(config.event_capacity);
    let state = Arc::new(SharedState::new(events.clone()));

    let host: Arc<dyn AudioGraph> = Arc::new(VirtualGraph::new());
    let (chain, next_songs) = ChainQueue::new(songs);
    let chain = Arc::new(chain);
    let first_song = chain.first();

    let engine = PlaybackEngine::new(config, host, chain, events);
    let _chain_driver = spawn_chain_driver(&engine, next_songs);

    if let Some(song) = first_song {
        if let Err(e) = engine.load_song(song).await {
            warn!("First session song failed to load: {}", e);
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let ctx = AppContext { state, engine };

    api::run(addr, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
