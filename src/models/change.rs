use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Orders,
    Drivers,
    Clients,
    Invoices,
    Threads,
    Messages,
    Complaints,
    OrderEvents,
    Notifications,
    Settings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// One row-level write, as broadcast on the change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: Option<Uuid>,
    pub at: DateTime<Utc>,
}
