use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::clients::{self, ClientChanges, ClientStats, NewClient};
use crate::engine::orders::{self, OrderFilter};
use crate::engine::invoicing;
use crate::error::AppError;
use crate::models::client::{BillingAddress, Client, ClientStatus};
use crate::models::invoice::Invoice;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clients", post(create_client).get(list_clients))
        .route("/clients/:id", get(get_client).patch(update_client))
        .route("/clients/:id/suspend", post(suspend_client))
        .route("/clients/:id/unsuspend", post(unsuspend_client))
        .route("/clients/:id/orders", get(client_orders))
        .route("/clients/:id/invoices", get(client_invoices))
        .route("/clients/:id/stats", get(client_stats))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub company_name: String,
    #[validate(length(max = 200))]
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[serde(default)]
    pub billing: BillingAddress,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 200))]
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub billing: Option<BillingAddress>,
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListClientsQuery {
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

async fn create_client(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<CreateClientRequest>,
) -> Result<Json<Client>, AppError> {
    actor.require_admin()?;
    payload.validate()?;

    let client = clients::create_client(
        &state,
        NewClient {
            company_name: payload.company_name,
            contact_name: payload.contact_name,
            email: payload.email,
            phone: payload.phone,
            billing: payload.billing,
        },
    )?;

    Ok(Json(client))
}

async fn list_clients(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Vec<Client>>, AppError> {
    actor.require_admin()?;
    Ok(Json(clients::list_clients(&state, query.status)))
}

async fn get_client(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    actor.require_admin_or_client(id)?;
    Ok(Json(clients::get_client(&state, id)?))
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    actor.require_admin_or_client(id)?;
    payload.validate()?;
    if payload.status.is_some() && !actor.0.is_admin() {
        return Err(AppError::Forbidden("only an admin can change a client status".to_string()));
    }

    let client = clients::apply_changes(
        &state,
        id,
        ClientChanges {
            company_name: payload.company_name,
            contact_name: payload.contact_name,
            email: payload.email,
            phone: payload.phone,
            billing: payload.billing,
            status: payload.status,
        },
    )?;

    Ok(Json(client))
}

async fn suspend_client(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    payload: Option<Json<SuspendRequest>>,
) -> Result<Json<Client>, AppError> {
    actor.require_admin()?;
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(clients::suspend(&state, id, reason)?))
}

async fn unsuspend_client(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    actor.require_admin()?;
    Ok(Json(clients::unsuspend(&state, id)?))
}

async fn client_orders(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    actor.require_admin_or_client(id)?;
    let filter = OrderFilter {
        client_id: Some(id),
        ..OrderFilter::default()
    };
    Ok(Json(orders::list_orders(&state, &filter)))
}

async fn client_invoices(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    actor.require_admin_or_client(id)?;
    Ok(Json(invoicing::list_invoices(&state, None, Some(id))))
}

async fn client_stats(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientStats>, AppError> {
    actor.require_admin_or_client(id)?;
    Ok(Json(clients::stats(&state, id)?))
}
