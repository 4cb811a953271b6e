use std::sync::Arc;

use anyhow::{Error, Result};
use delivery_engine::{
    api::{AppState, run_api_server},
    clients::{
        channel::ChannelSet,
        database::DatabaseClient,
        health::HealthChecker,
        push::PushChannel,
        realtime::RealtimeChannel,
        redis::RedisBroadcaster,
        sms::{HttpSmsGateway, SmsChannel},
        store::Stores,
    },
    config::Config,
    engine::DeliveryEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("delivery_engine=info,tower_http=info")),
        )
        .init();

    let config = Config::load()?;
    info!(port = config.server_port, "Configuration loaded");

    let database = Arc::new(DatabaseClient::connect(&config.database_url).await?);
    database.migrate().await?;

    let redis = RedisBroadcaster::connect(&config).await?;
    let broadcaster = Arc::new(redis.clone());
    let gateway = Arc::new(HttpSmsGateway::from_config(&config)?);

    let channels = ChannelSet::new(
        Arc::new(PushChannel::new(database.clone(), broadcaster.clone())),
        Arc::new(RealtimeChannel::new(broadcaster)),
        Arc::new(SmsChannel::new(database.clone(), gateway)),
    );
    let stores = Stores::new(database.clone(), database.clone());

    let engine = Arc::new(DeliveryEngine::new(
        channels,
        stores,
        config.engine_config(),
    ));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        health_checker: HealthChecker::new(database, redis, engine.clone()),
    });

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    run_api_server(state, config.server_port, shutdown).await?;

    engine.shutdown(config.shutdown_grace()).await;
    info!("Delivery engine stopped");

    Ok(())
}
