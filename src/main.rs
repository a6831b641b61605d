use std::sync::Arc;
use std::time::Duration;

use one_connexion::api;
use one_connexion::config::{Config, LogFormat};
use one_connexion::engine::{invoicing, notifier};
use one_connexion::error::AppError;
use one_connexion::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let (app_state, notification_rx) = AppState::new(
        config.business.clone(),
        config.notification_queue_size,
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(notifier::run_notification_worker(
        shared_state.clone(),
        notification_rx,
    ));
    tokio::spawn(invoicing::run_overdue_sweep(
        shared_state.clone(),
        Duration::from_secs(config.overdue_sweep_secs.max(1)),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
