//! ZapFlow - outreach backend entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zapflow_api::AppState;
use zapflow_common::config::Config;
use zapflow_core::{
    CloudApiTransport, CloudConfig, ConnectionRegistry, ContactImporter, DeliveryTracker,
    DripEngine, Dispatcher, EventBus, SchedulingEngine, Transport,
};
use zapflow_storage::repository::{
    ContactRepository, ScheduledMessageRepository, SenderSettingsRepository, TemplateRepository,
};
use zapflow_storage::DatabasePool;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting ZapFlow backend...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    let pool = db_pool.pool().clone();
    let events = EventBus::default();

    // Register configured accounts and bring up their transports.
    // A failed connect is not fatal: the account stays registered and its
    // messages wait in the queue until it comes up.
    let registry = Arc::new(ConnectionRegistry::new());
    let settings_repo = SenderSettingsRepository::new(pool.clone());

    for account in &config.accounts {
        let transport = Arc::new(CloudApiTransport::new(CloudConfig {
            access_token: account.access_token.clone(),
            phone_number_id: account.phone_number_id.clone(),
            api_base: None,
        }));

        if let Err(e) = transport.connect().await {
            warn!(account = %account.id, "Transport connect failed: {}", e);
        }

        // Settings row exists from the first tick onward
        settings_repo.get_or_default(&account.id).await?;
        registry.register(account.id.clone(), transport).await;
    }

    // Status pushes: anything interested subscribes to the bus instead of
    // polling the store. The server keeps one subscriber for the log.
    let mut status_rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => tracing::debug!(
                    message = %event.message_id,
                    account = %event.account_id,
                    status = %event.status,
                    "Status change"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Delivery tracker consumes provider acknowledgements
    let (delivery_tx, delivery_rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();

    let tracker = DeliveryTracker::new(pool.clone(), events.clone());
    let tracker_shutdown = shutdown.clone();
    let tracker_handle = tokio::spawn(async move {
        tracker.run(delivery_rx, tracker_shutdown).await;
    });

    // Dispatch loop
    let dispatcher = Arc::new(
        Dispatcher::new(pool.clone(), registry.clone(), events.clone())
            .with_tick_period(Duration::from_secs(config.dispatch.tick_secs))
            .with_send_timeout(Duration::from_secs(config.dispatch.send_timeout_secs)),
    );
    let dispatch_ticker = dispatcher.start();

    // API server
    let state = Arc::new(AppState {
        db_pool: db_pool.clone(),
        engine: SchedulingEngine::new(
            ScheduledMessageRepository::new(pool.clone()),
            ContactRepository::new(pool.clone()),
            TemplateRepository::new(pool.clone()),
            events.clone(),
        ),
        drip_engine: DripEngine::new(pool.clone()),
        importer: ContactImporter::new(ContactRepository::new(pool.clone())),
        delivery_tx,
    });

    let app = zapflow_api::create_router(state);
    let bind = format!("{}:{}", config.api.bind, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API server listening on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("ZapFlow backend started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    dispatch_ticker.shutdown().await;
    api_handle.abort();
    let _ = tracker_handle.await;

    info!("ZapFlow backend shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,zapflow=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
