use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::orders::{self, NewOrder, OrderFilter, RefusalHistory};
use crate::engine::ranking::{self, Candidate};
use crate::engine::{dispatch, documents, driver_actions, events};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::event::{ActorType, OrderEvent};
use crate::models::order::{Address, Formula, Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/unassign", post(unassign_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/duplicate", post(duplicate_order))
        .route("/orders/:id/events", get(order_events))
        .route("/orders/:id/refusals", get(order_refusals))
        .route("/orders/:id/candidates", get(order_candidates))
        .route("/orders/:id/voucher", get(order_voucher))
        .route("/orders/:id/driver-accept", post(driver_accept))
        .route("/orders/:id/driver-decline", post(driver_decline))
        .route("/orders/:id/start", post(start_delivery))
        .route("/orders/:id/complete", post(complete_delivery))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub location: Option<GeoPoint>,
}

impl From<AddressRequest> for Address {
    fn from(request: AddressRequest) -> Self {
        Address {
            street: request.street.trim().to_string(),
            city: request.city.trim().to_string(),
            location: request.location,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub client_id: Option<Uuid>,
    #[validate(nested)]
    pub pickup: AddressRequest,
    #[validate(nested)]
    pub delivery: AddressRequest,
    pub formula: Formula,
    #[validate(length(max = 500))]
    pub package_description: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub scheduled_pickup_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0))]
    pub distance_meters: Option<f64>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub client_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub driver_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Admins see every order, clients their own, drivers the ones assigned to
/// them.
fn visible_order(state: &AppState, id: Uuid, actor: &CurrentActor) -> Result<Order, AppError> {
    let order = orders::get_order(state, id)?;
    let visible = match actor.0.actor_type {
        ActorType::Admin | ActorType::System => true,
        ActorType::Client => order.client_id == actor.id(),
        ActorType::Driver => order.driver_id == Some(actor.id()),
    };
    if !visible {
        return Err(AppError::Forbidden("not your order".to_string()));
    }
    Ok(order)
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    payload.validate()?;

    let client_id = match actor.0.actor_type {
        ActorType::Client => actor.id(),
        ActorType::Admin => payload
            .client_id
            .ok_or_else(|| AppError::BadRequest("client_id is required".to_string()))?,
        _ => return Err(AppError::Forbidden("drivers cannot create orders".to_string())),
    };

    let order = orders::create_order(
        &state,
        NewOrder {
            client_id,
            pickup: payload.pickup.into(),
            delivery: payload.delivery.into(),
            formula: payload.formula,
            package_description: payload.package_description,
            notes: payload.notes,
            scheduled_pickup_at: payload.scheduled_pickup_at,
            distance_meters: payload.distance_meters,
            price_override: payload.price,
        },
        &actor.0,
    )?;

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    let mut filter = OrderFilter {
        status: query.status,
        client_id: query.client_id,
        driver_id: query.driver_id,
        search: query.search,
    };
    match actor.0.actor_type {
        ActorType::Client => filter.client_id = Some(actor.id()),
        ActorType::Driver => filter.driver_id = Some(actor.id()),
        ActorType::Admin | ActorType::System => {}
    }

    Json(orders::list_orders(&state, &filter))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(visible_order(&state, id, &actor)?))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    actor.require_admin()?;
    Ok(Json(orders::accept_order(&state, id, &actor.0)?))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<DispatchRequest>,
) -> Result<Json<Order>, AppError> {
    actor.require_admin()?;
    Ok(Json(dispatch::dispatch_order(
        &state,
        id,
        payload.driver_id,
        &actor.0,
    )?))
}

async fn unassign_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<Json<Order>, AppError> {
    actor.require_admin()?;
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(orders::unassign_order(&state, id, reason, &actor.0)?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Order>, AppError> {
    payload.validate()?;
    if actor.0.actor_type == ActorType::Driver {
        return Err(AppError::Forbidden("drivers decline, they do not cancel".to_string()));
    }
    Ok(Json(orders::cancel_order(
        &state,
        id,
        payload.reason.trim().to_string(),
        &actor.0,
    )?))
}

async fn duplicate_order(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    if actor.0.actor_type == ActorType::Driver {
        return Err(AppError::Forbidden("drivers cannot create orders".to_string()));
    }
    Ok(Json(orders::duplicate_order(&state, id, &actor.0)?))
}

async fn order_events(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderEvent>>, AppError> {
    visible_order(&state, id, &actor)?;
    Ok(Json(events::history(&state, id)))
}

async fn order_refusals(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<RefusalHistory>, AppError> {
    actor.require_admin()?;
    Ok(Json(orders::refusals(&state, id)?))
}

async fn order_candidates(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    actor.require_admin()?;
    Ok(Json(ranking::candidates_for_order(&state, id)?))
}

async fn order_voucher(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let order = visible_order(&state, id, &actor)?;
    let client = state
        .clients
        .get(&order.client_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("client {} not found", order.client_id)))?;
    let driver = order
        .driver_id
        .and_then(|driver_id| state.drivers.get(&driver_id).map(|entry| entry.value().clone()));

    Ok(Html(documents::render_order_voucher_html(
        &order,
        &client,
        driver.as_ref(),
    )))
}

async fn driver_accept(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let driver_id = actor.require_driver()?;
    Ok(Json(driver_actions::accept(&state, id, driver_id)?))
}

async fn driver_decline(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReasonRequest>>,
) -> Result<Json<Order>, AppError> {
    let driver_id = actor.require_driver()?;
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(driver_actions::decline(&state, id, driver_id, reason)?))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let driver_id = actor.require_driver()?;
    Ok(Json(driver_actions::start(&state, id, driver_id)?))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let driver_id = actor.require_driver()?;
    Ok(Json(driver_actions::complete(&state, id, driver_id)?))
}
