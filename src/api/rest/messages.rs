use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::rest::actor::CurrentActor;
use crate::engine::messaging::{self, NewComplaint, NewThread, ThreadSummary};
use crate::error::AppError;
use crate::models::event::ActorType;
use crate::models::message::{Complaint, Message, Thread, ThreadStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/threads", get(list_threads).post(create_thread))
        .route("/threads/:id/messages", get(thread_messages).post(send_message))
        .route("/threads/:id/read", post(mark_read))
        .route("/threads/:id/status", patch(update_status))
        .route("/complaints", get(list_complaints).post(create_complaint))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    pub client_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ThreadStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintRequest {
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListComplaintsQuery {
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

async fn list_threads(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
) -> Json<Vec<ThreadSummary>> {
    Json(messaging::list_threads(&state, &actor.0))
}

async fn create_thread(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<Json<Thread>, AppError> {
    payload.validate()?;
    Ok(Json(messaging::create_thread(
        &state,
        NewThread {
            client_id: payload.client_id,
            driver_id: payload.driver_id,
            subject: payload.subject,
            content: payload.content,
        },
        &actor.0,
    )?))
}

async fn thread_messages(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(messaging::thread_messages(&state, id, &actor.0)?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    payload.validate()?;
    Ok(Json(messaging::send_message(
        &state,
        id,
        payload.content,
        &actor.0,
    )?))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let marked = messaging::mark_read(&state, id, &actor.0)?;
    Ok(Json(MarkReadResponse { marked }))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Thread>, AppError> {
    actor.require_admin()?;
    Ok(Json(messaging::update_thread_status(&state, id, payload.status)?))
}

async fn create_complaint(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Json(payload): Json<CreateComplaintRequest>,
) -> Result<Json<Complaint>, AppError> {
    payload.validate()?;
    Ok(Json(messaging::create_complaint(
        &state,
        NewComplaint {
            order_id: payload.order_id,
            subject: payload.subject,
            description: payload.description,
        },
        &actor.0,
    )?))
}

async fn list_complaints(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Query(query): Query<ListComplaintsQuery>,
) -> Result<Json<Vec<Complaint>>, AppError> {
    let client_id = match actor.0.actor_type {
        ActorType::Admin => query.client_id,
        ActorType::Client => Some(actor.id()),
        _ => return Err(AppError::Forbidden("access denied".to_string())),
    };
    Ok(Json(messaging::list_complaints(&state, client_id)))
}
