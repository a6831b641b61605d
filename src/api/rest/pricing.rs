use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::pricing::{self, PricingConfig, Quote, TariffTable};
use crate::error::AppError;
use crate::models::order::Formula;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pricing/quote", post(quote))
        .route("/pricing/quotes", post(quote_all))
        .route("/settings/pricing", get(get_settings).put(update_settings))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1, max = 100))]
    pub departure_city: String,
    #[validate(length(min = 1, max = 100))]
    pub arrival_city: String,
    #[validate(range(min = 0.0))]
    pub distance_meters: f64,
    pub formula: Formula,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteAllRequest {
    #[validate(length(min = 1, max = 100))]
    pub departure_city: String,
    #[validate(length(min = 1, max = 100))]
    pub arrival_city: String,
    #[validate(range(min = 0.0))]
    pub distance_meters: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(range(min = 0.0))]
    pub bon_value_eur: Option<f64>,
    #[validate(range(min = 0.0))]
    pub supplement_per_km_bons: Option<f64>,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    payload.validate()?;
    Ok(Json(pricing::quote(
        TariffTable::embedded(),
        &payload.departure_city,
        &payload.arrival_city,
        payload.distance_meters,
        payload.formula,
        &PricingConfig::resolve(&state),
    )?))
}

async fn quote_all(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteAllRequest>,
) -> Result<Json<Vec<Quote>>, AppError> {
    payload.validate()?;
    Ok(Json(pricing::quote_all_formulas(
        TariffTable::embedded(),
        &payload.departure_city,
        &payload.arrival_city,
        payload.distance_meters,
        &PricingConfig::resolve(&state),
    )?))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<PricingConfig> {
    Json(PricingConfig::resolve(&state))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<PricingConfig>, AppError> {
    actor.require_admin()?;
    payload.validate()?;
    Ok(Json(pricing::update_settings(
        &state,
        payload.bon_value_eur,
        payload.supplement_per_km_bons,
    )?))
}
