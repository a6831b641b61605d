use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::change::{ChangeKind, Table};
use crate::models::notification::{Notification, NotificationKind};
use crate::state::AppState;

/// Queues a notification for the worker. A full or closed queue is logged
/// and swallowed: notifications never fail the operation that raised them.
pub fn notify(
    state: &AppState,
    user_id: Uuid,
    kind: NotificationKind,
    title: impl Into<String>,
    message: impl Into<String>,
    data: Value,
) {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        kind,
        title: title.into(),
        message: message.into(),
        data,
        is_read: false,
        created_at: Utc::now(),
    };

    match state.notification_tx.try_send(notification) {
        Ok(()) => state.metrics.notifications_in_queue.inc(),
        Err(err) => warn!(
            user_id = %user_id,
            kind = kind.as_str(),
            error = %err,
            "notification dropped"
        ),
    }
}

pub async fn run_notification_worker(
    state: Arc<AppState>,
    mut notification_rx: mpsc::Receiver<Notification>,
) {
    info!("notification worker started");

    while let Some(notification) = notification_rx.recv().await {
        state.metrics.notifications_in_queue.dec();

        let id = notification.id;
        info!(
            notification_id = %id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "notification stored"
        );
        state.notifications.insert(id, notification);
        state.publish(Table::Notifications, ChangeKind::Insert, Some(id));
    }

    warn!("notification worker stopped: queue channel closed");
}

pub fn for_user(state: &AppState, user_id: Uuid) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = state
        .notifications
        .iter()
        .filter(|entry| entry.value().user_id == user_id)
        .map(|entry| entry.value().clone())
        .collect();

    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

pub fn mark_read(state: &AppState, notification_id: Uuid) -> Option<Notification> {
    let mut notification = state.notifications.get_mut(&notification_id)?;
    notification.is_read = true;
    let updated = notification.clone();
    drop(notification);

    state.publish(Table::Notifications, ChangeKind::Update, Some(notification_id));
    Some(updated)
}
