use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod attendance;
mod checkin;
mod config;
mod error;
mod http;
mod recognition;
mod store;
#[cfg(test)]
mod testing;

use checkin::CheckinService;
use http::AppState;
use recognition::RecognitionClient;
use store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facecheckd starting");

    let config = config::Config::from_env();
    let thresholds = config.thresholds()?;
    let quality_min = config.quality_minimum()?;
    tracing::info!(
        bind = %config.bind,
        db = %config.db_path.display(),
        recognition_url = %config.recognition_url,
        accept = thresholds.accept,
        low_confidence = thresholds.low_confidence,
        quality_min,
        "configuration loaded"
    );

    let store = Store::open(&config.db_path).await?;
    let client = RecognitionClient::new(&config.recognition_url, config.recognition_timeout())?;
    let checkin = CheckinService::new(
        client,
        store.clone(),
        thresholds,
        quality_min,
        config.checkin_timeout(),
    );
    let state = Arc::new(AppState { store, checkin });

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "facecheckd ready");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facecheckd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
