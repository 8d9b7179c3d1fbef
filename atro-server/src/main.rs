//! # ATRO Server
//!
//! Realtime hub for the ATRO security dashboard.
//!
//! ## Overview
//!
//! - **Realtime fan-out**: one WebSocket endpoint; every store mutation is
//!   pushed to all connected dashboards in a single ordered stream
//! - **Agent supervision**: worker programs are launched, monitored and
//!   stopped on request; their stdout becomes alerts, incidents and logs
//! - **Context cache**: Redis when reachable, an in-process cache otherwise
//! - **Log analysis**: free text is classified by an OpenAI-compatible API
//!
//! Without any configuration the server runs against the in-memory store
//! and the in-process cache.

use std::path::PathBuf;

use anyhow::Context;
use atro_config::ConfigLoader;
use atro_server::{
    infra::startup::{self, Bootstrap},
    routes,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "atro-server")]
#[command(about = "Realtime hub for the ATRO security dashboard")]
struct Cli {
    /// Path to a TOML config file (overrides ATRO_CONFIG_PATH)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Start every agent's worker once the server is listening
    #[arg(long, env = "ATRO_START_AGENTS", default_value_t = false)]
    start_agents: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config.clone() {
        loader = loader.with_config_path(path);
    }
    let load = loader.load().context("failed to load configuration")?;
    load.log_warnings();

    let mut config = load.config;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }

    let Bootstrap { state, events } = startup::bootstrap(config).await?;
    let broadcaster = startup::start_background_tasks(&state, events).await;

    let addr = state.config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        store = %state.store.backend(),
        classifier = state.analyzer.classifier_name(),
        "Starting ATRO hub"
    );

    if cli.start_agents {
        let outcome = state.supervisor.start_all().await?;
        info!(
            started = outcome.changed.len(),
            failed = outcome.failed.len(),
            "started agents"
        );
    }

    axum::serve(listener, routes::create_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let outcome = state.supervisor.shutdown().await;
    if !outcome.failed.is_empty() {
        warn!(failed = outcome.failed.len(), "some workers did not stop cleanly");
    }
    broadcaster.abort();
    info!("ATRO hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
