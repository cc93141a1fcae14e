//! Seamap vector layer HTTP microservice.
//!
//! # Configuration
//!
//! - `VECTOR_DATA_DIR` - Directory of `.gpkg`/`.geojson` containers (default: data/vector)
//! - `SERVICE_PORT` - HTTP port (default: 8080)
//! - `RESPONSE_CACHE_CAPACITY`, `RESPONSE_MAX_BYTES`, `CACHE_MAX_AGE_SECS`, `LOAD_TIMEOUT_MS`
//! - `RUST_LOG` - Log level (default: info)
//! - `LOG_FORMAT` - Log format: json (default) or text
//! - `METRICS_ENABLED` - Set to `false` to disable the Prometheus recorder
//!
//! Send `SIGHUP` to rediscover layers without restarting.

use std::net::SocketAddr;

use tracing::{Instrument, error, info};

use seamap_service_shared::{
    AppState, LoggingConfig, MetricsConfig, ServiceConfig, init_logging, init_metrics,
    record_catalog_state,
};
use seamap_service_vector::router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_config = LoggingConfig::from_env().with_service("vector");
    let service_span = init_logging(&logging_config);
    run().instrument(service_span).await
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let metrics_config = MetricsConfig::from_env();
    if let Err(e) = init_metrics(&metrics_config) {
        tracing::warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    let config = ServiceConfig::from_env();
    info!(
        data_dir = %config.catalog.data_dir.display(),
        port = config.port,
        cache_capacity = config.catalog.response_cache_capacity,
        load_timeout_ms = config.load_timeout.as_millis() as u64,
        "starting vector layer service"
    );

    let loader = config.clone();
    let state = tokio::task::spawn_blocking(move || AppState::load(&loader))
        .await?
        .map_err(|e| {
            error!(error = %e, "failed to load application state");
            e
        })?;
    let snapshot = state.catalog().snapshot();
    record_catalog_state(snapshot.len(), snapshot.generation());

    spawn_reload_listener(state.clone());

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(addr = %addr, "listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vector layer service stopped");
    Ok(())
}

/// Rediscover the catalog on every `SIGHUP`.
#[cfg(unix)]
fn spawn_reload_listener(state: AppState) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP; reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("SIGHUP received, reloading vector catalog");
            let catalog = state.catalog_arc();
            match tokio::task::spawn_blocking(move || catalog.reload()).await {
                Ok(snapshot) => record_catalog_state(snapshot.len(), snapshot.generation()),
                Err(e) => error!(error = %e, "catalog reload task failed"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_state: AppState) {
    info!("signal-driven reload is only available on unix");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
