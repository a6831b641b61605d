use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::actor::CurrentActor;
use crate::engine::notifier;
use crate::engine::stats::{self, AdminStats};
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_read))
        .route("/stats", get(admin_stats))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
) -> Json<Vec<Notification>> {
    Json(notifier::for_user(&state, actor.id()))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let owned = state
        .notifications
        .get(&id)
        .map(|entry| entry.value().user_id == actor.id())
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
    if !owned {
        return Err(AppError::Forbidden("not your notification".to_string()));
    }

    notifier::mark_read(&state, id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))
}

async fn admin_stats(
    State(state): State<Arc<AppState>>,
    actor: CurrentActor,
) -> Result<Json<AdminStats>, AppError> {
    actor.require_admin()?;
    Ok(Json(stats::admin_stats(&state)))
}
