use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    Created,
    Accepted,
    Dispatched,
    Unassigned,
    DriverAccepted,
    DriverDeclined,
    InProgress,
    Delivered,
    Cancelled,
    StatusChanged,
}

impl OrderEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventType::Created => "created",
            OrderEventType::Accepted => "accepted",
            OrderEventType::Dispatched => "dispatched",
            OrderEventType::Unassigned => "unassigned",
            OrderEventType::DriverAccepted => "driver_accepted",
            OrderEventType::DriverDeclined => "driver_declined",
            OrderEventType::InProgress => "in_progress",
            OrderEventType::Delivered => "delivered",
            OrderEventType::Cancelled => "cancelled",
            OrderEventType::StatusChanged => "status_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Admin,
    Client,
    Driver,
    System,
}

/// Audit-log row of the `order_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: OrderEventType,
    pub description: String,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Who performs an operation, as recorded on audit rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub actor_type: ActorType,
    pub id: Option<Uuid>,
}

impl Actor {
    pub fn admin(id: Uuid) -> Self {
        Self {
            actor_type: ActorType::Admin,
            id: Some(id),
        }
    }

    pub fn client(id: Uuid) -> Self {
        Self {
            actor_type: ActorType::Client,
            id: Some(id),
        }
    }

    pub fn driver(id: Uuid) -> Self {
        Self {
            actor_type: ActorType::Driver,
            id: Some(id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.actor_type == ActorType::Admin
    }
}
