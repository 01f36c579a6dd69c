//! GroupBid daemon - group formation and threshold commitment service
//!
//! Provides:
//! - REST API for group/bid/acceptance management
//! - Background sweeper for deadline-driven transitions
//! - Event streaming for collaborator notification

use clap::Parser;
use groupbid_service::api::{create_router, AppState};
use groupbid_service::{
    GroupService, InMemoryGroupStore, InstantGateway, ServiceConfig, Sweeper,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// GroupBid daemon CLI
#[derive(Parser)]
#[command(name = "groupbidd")]
#[command(about = "GroupBid daemon - group bidding commitment engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(
        short,
        long,
        env = "GROUPBID_LISTEN_ADDR",
        default_value = "127.0.0.1:8080"
    )]
    listen: String,

    /// Sweep interval in seconds
    #[arg(long, env = "GROUPBID_SWEEP_INTERVAL", default_value_t = 30)]
    sweep_interval: u64,

    /// Log level
    #[arg(long, env = "GROUPBID_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "GROUPBID_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = ServiceConfig::default();
    config.server.listen_addr = cli
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address: {}", e))?;
    config.sweeper.sweep_interval_secs = cli.sweep_interval;

    // The dev gateway confirms every payment instantly; its updates are
    // drained back into the service like webhook deliveries
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let gateway = Arc::new(InstantGateway::new(update_tx));

    let store = Arc::new(InMemoryGroupStore::new());
    let service = Arc::new(GroupService::new(store.clone(), gateway, config.clone()));

    let (sweeper, sweep_rx) = Sweeper::new(
        config.clone(),
        store,
        service.settlement(),
        service.event_sender(),
    );
    tokio::spawn(sweeper.clone().start(sweep_rx));

    // Payment update drain
    let update_service = service.clone();
    tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            if let Err(e) = update_service.handle_payment_update(update).await {
                tracing::error!(error = %e, "Failed to apply payment update");
            }
        }
    });

    let state = AppState::new(service, sweeper);
    let router = create_router(state);

    tracing::info!(listen = %config.server.listen_addr, "GroupBid daemon listening");

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
