use std::{process, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hosts_gateway::{server, Config, State};

const TRACING_TARGET_STARTUP: &str = "hosts_gateway::startup";
const TRACING_TARGET_SHUTDOWN: &str = "hosts_gateway::shutdown";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(target: TRACING_TARGET_SHUTDOWN, "server stopped");
        return;
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "server terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }
    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing();

    config.validate().context("invalid configuration")?;
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        addr = %config.socket_addr(),
        "starting hosts gateway"
    );

    let state = State::from_config(&config)
        .await
        .context("failed to initialize backends")?;
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        backends = %state.startup.summary(),
        "backends probed"
    );

    let listener = TcpListener::bind(config.socket_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.socket_addr()))?;
    axum::serve(listener, server::router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %e,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(target: TRACING_TARGET_SHUTDOWN, "shutdown signal received");
}
