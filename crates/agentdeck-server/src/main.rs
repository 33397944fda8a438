//! `agentdeck` server binary.

use agentdeck_core::DeckConfig;
use agentdeck_server::{router, AppState};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agentdeck", about = "Chat with and orchestrate ACP agents", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "AGENTDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let mut config = match &args.config {
        Some(path) => DeckConfig::load_from_path(path)?,
        None => DeckConfig::from_env()?,
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    info!(
        "Workspace {:?}, agent command {} {:?}",
        config.workspace_dir, config.agent_command, config.agent_args
    );

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config)?;
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    info!("Listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler, using ctrl-c only: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::error!("ctrl-c signal handler failed: {}", e);
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init tracing: {}", e))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init tracing: {}", e))?,
    }

    Ok(())
}
