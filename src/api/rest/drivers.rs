use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::drivers::{self, NewDriver};
use crate::engine::driver_actions;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, Vehicle};
use crate::models::event::ActorType;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_status))
        .route("/drivers/:id/location", patch(update_location))
        .route("/drivers/:id/orders", get(active_orders))
        .route("/drivers/:id/documents/submit", post(submit_documents))
        .route("/drivers/:id/documents/approve", post(approve_documents))
        .route("/drivers/:id/documents/reject", post(reject_documents))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDriverRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 20))]
    pub phone: String,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDriversQuery {
    pub status: Option<DriverStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

fn require_self_or_admin(actor: &CurrentActor, driver_id: Uuid) -> Result<(), AppError> {
    match actor.0.actor_type {
        ActorType::Admin => Ok(()),
        ActorType::Driver if actor.id() == driver_id => Ok(()),
        _ => Err(AppError::Forbidden("access denied".to_string())),
    }
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;
    payload.validate()?;

    let driver = drivers::create_driver(
        &state,
        NewDriver {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            phone: payload.phone,
            vehicle: payload.vehicle,
        },
    )?;

    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Query(query): Query<ListDriversQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    actor.require_admin()?;
    Ok(Json(drivers::list_drivers(&state, query.status)))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    require_self_or_admin(&actor, id)?;
    Ok(Json(drivers::get_driver(&state, id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    require_self_or_admin(&actor, id)?;

    if !actor.0.is_admin() {
        let current = drivers::get_driver(&state, id)?;
        if current.status == DriverStatus::Suspended || payload.status == DriverStatus::Suspended {
            return Err(AppError::Forbidden(
                "only an admin can change a suspension".to_string(),
            ));
        }
    }

    Ok(Json(drivers::set_status(&state, id, payload.status)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    if actor.require_driver()? != id {
        return Err(AppError::Forbidden("drivers report their own position".to_string()));
    }

    Ok(Json(drivers::update_location(
        &state,
        id,
        GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
    )?))
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    require_self_or_admin(&actor, id)?;
    drivers::get_driver(&state, id)?;
    Ok(Json(driver_actions::active_orders(&state, id)))
}

async fn submit_documents(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    if actor.require_driver()? != id {
        return Err(AppError::Forbidden("drivers submit their own documents".to_string()));
    }
    Ok(Json(drivers::submit_documents(&state, id)?))
}

async fn approve_documents(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    payload: Option<Json<ApproveRequest>>,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;
    let notes = payload.and_then(|Json(body)| body.notes);
    Ok(Json(drivers::approve_documents(&state, id, &actor.0, notes)?))
}

async fn reject_documents(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;
    payload.validate()?;
    Ok(Json(drivers::reject_documents(
        &state,
        id,
        &actor.0,
        &payload.reason,
    )?))
}
