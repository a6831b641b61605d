use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::invoicing::{self, ReminderSummary};
use crate::engine::{clients, documents};
use crate::error::AppError;
use crate::models::event::ActorType;
use crate::models::invoice::{Invoice, InvoiceStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/generate", post(generate_invoice))
        .route("/invoices/reminders", post(send_reminders))
        .route("/invoices/:id", get(get_invoice))
        .route("/invoices/:id/pay", post(mark_paid))
        .route("/invoices/:id/html", get(invoice_html))
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoiceRequest {
    pub client_id: Uuid,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
}

fn visible_invoice(state: &AppState, id: Uuid, actor: &CurrentActor) -> Result<Invoice, AppError> {
    let invoice = invoicing::get_invoice(state, id)?;
    actor.require_admin_or_client(invoice.client_id)?;
    Ok(invoice)
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let client_id = match actor.0.actor_type {
        ActorType::Admin => query.client_id,
        ActorType::Client => Some(actor.id()),
        _ => return Err(AppError::Forbidden("access denied".to_string())),
    };
    Ok(Json(invoicing::list_invoices(&state, query.status, client_id)))
}

async fn generate_invoice(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<GenerateInvoiceRequest>,
) -> Result<Json<Invoice>, AppError> {
    actor.require_admin()?;
    payload.validate()?;
    Ok(Json(invoicing::generate_monthly(
        &state,
        payload.client_id,
        payload.year,
        payload.month,
    )?))
}

async fn send_reminders(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
) -> Result<Json<ReminderSummary>, AppError> {
    actor.require_admin()?;
    Ok(Json(invoicing::send_payment_reminders(&state)))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(visible_invoice(&state, id, &actor)?))
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    actor.require_admin()?;
    Ok(Json(invoicing::mark_paid(&state, id)?))
}

async fn invoice_html(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let invoice = visible_invoice(&state, id, &actor)?;
    let client = clients::get_client(&state, invoice.client_id)?;
    Ok(Html(documents::render_invoice_html(&invoice, &client)))
}
