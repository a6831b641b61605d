use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    OrderUnassigned,
    PaymentConfirmed,
    PaymentReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewOrder => "new_order",
            NotificationKind::OrderUnassigned => "order_unassigned",
            NotificationKind::PaymentConfirmed => "payment_confirmed",
            NotificationKind::PaymentReminder => "payment_reminder",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
