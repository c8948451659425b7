//! jsshd daemon
//!
//! Accepts SSH connections and runs an audited shell session for each
//! authenticated client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use russh::keys::HashAlg;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jsshd_core::config::{self, SshdConfig};
use jsshd_server::server::{load_or_generate_host_key, SshServer};
use jsshd_server::ServerState;

#[derive(Parser)]
#[command(name = "jsshd")]
#[command(about = "SSH daemon with audited shell sessions")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("jsshd starting...");

    let config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                SshdConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            SshdConfig::default()
        }
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    let host_key = load_or_generate_host_key(&config.host_key_path).await?;
    tracing::info!(
        "Host key fingerprint: {}",
        host_key.public_key().fingerprint(HashAlg::Sha256)
    );

    let state = Arc::new(ServerState::from_config(config));

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                shutdown.trigger("received Ctrl+C");
            }
            _ = terminate => {
                shutdown.trigger("received SIGTERM");
            }
        }
    });

    let server = SshServer::new(host_key, Arc::clone(&state));

    tracing::info!("Starting SSH server on {}", bind_addr);
    server.run(&bind_addr).await?;

    tracing::info!("jsshd shutdown complete");
    Ok(())
}
