pub mod actor;
pub mod clients;
pub mod drivers;
pub mod invoices;
pub mod messages;
pub mod notifications;
pub mod orders;
pub mod pricing;
pub mod sse;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(orders::router())
        .merge(drivers::router())
        .merge(clients::router())
        .merge(invoices::router())
        .merge(messages::router())
        .merge(pricing::router())
        .merge(notifications::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/events", get(sse::sse_handler))
        .with_state(state)
        .layer(cors)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    drivers: usize,
    clients: usize,
    invoices: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        drivers: state.drivers.len(),
        clients: state.clients.len(),
        invoices: state.invoices.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
