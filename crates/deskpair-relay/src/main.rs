//! deskpair-relay: pairing broker for screen sharing and remote control.
//!
//! Serves session creation and status over HTTP and relays messages between
//! the producer and consumer WebSockets of each session. Payloads are opaque.

use std::path::PathBuf;

use clap::Parser;
use deskpair_common::{ConfigError, DeskpairError};
use deskpair_config::DeskpairConfig;
use deskpair_relay::{http, spawn_sweeper, AppState};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "deskpair-relay", about = "Session pairing relay for screen sharing and remote control")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// Seconds of inactivity after which a session is reaped.
    #[arg(long)]
    session_ttl: Option<u64>,

    /// Directory of pages to serve at `/`.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("deskpair-relay: {e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "deskpair-relay stopped");
        std::process::exit(1);
    }
}

/// File (or defaults) first, then command-line overrides, then validation.
fn load_config(args: &Args) -> Result<DeskpairConfig, ConfigError> {
    let mut config = deskpair_config::load_or_default(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(ttl) = args.session_ttl {
        config.sessions.idle_timeout_secs = ttl;
    }
    if let Some(dir) = &args.static_dir {
        config.server.static_dir = Some(dir.clone());
    }

    deskpair_config::validation::validate(&config)?;
    Ok(config)
}

async fn run(config: DeskpairConfig) -> Result<(), DeskpairError> {
    let state = AppState::new(&config);

    let _sweeper = spawn_sweeper(
        state.registry.clone(),
        config.sessions.sweep_interval(),
        config.sessions.idle_timeout(),
    );

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        idle_timeout_secs = config.sessions.idle_timeout_secs,
        "deskpair-relay listening on {}",
        addr
    );

    http::serve(
        listener,
        state,
        config.server.static_dir.as_deref(),
        shutdown_signal(),
    )
    .await?;

    tracing::info!("deskpair-relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
