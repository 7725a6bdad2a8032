mod cli;
mod config;
mod delivery;
mod errors;
mod routes;
mod sink;
mod state;
mod worksheet;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;
use crate::worksheet::PageComposer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve => serve(config).await,
        command => cli::deliver(command, &config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Propisi API v{}", env!("CARGO_PKG_VERSION"));

    let composer = PageComposer::new(config.font()?);
    info!("Worksheet font: {}", composer.font().describe());

    let state = AppState { composer };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
