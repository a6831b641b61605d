use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

/// Service level the client booked. Each one has its own pickup tariff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    Normal,
    Express,
    Urgent,
    VlNormal,
    VlExpress,
}

impl Formula {
    pub const ALL: [Formula; 5] = [
        Formula::Normal,
        Formula::Express,
        Formula::Urgent,
        Formula::VlNormal,
        Formula::VlExpress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Formula::Normal => "normal",
            Formula::Express => "express",
            Formula::Urgent => "urgent",
            Formula::VlNormal => "vl_normal",
            Formula::VlExpress => "vl_express",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingAcceptance,
    Accepted,
    #[serde(alias = "assigned")]
    Dispatched,
    DriverAccepted,
    DriverRefused,
    InProgress,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::PendingAcceptance,
        OrderStatus::Accepted,
        OrderStatus::Dispatched,
        OrderStatus::DriverAccepted,
        OrderStatus::DriverRefused,
        OrderStatus::InProgress,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingAcceptance => "pending_acceptance",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::DriverAccepted => "driver_accepted",
            OrderStatus::DriverRefused => "driver_refused",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Orders waiting in the admin's "to dispatch" pile.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::DriverRefused)
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses in which an order still sits on the driver's screen.
    pub fn is_on_driver(&self) -> bool {
        matches!(
            self,
            OrderStatus::Dispatched | OrderStatus::DriverAccepted | OrderStatus::InProgress
        )
    }

    /// Statuses that keep a driver busy.
    pub fn keeps_driver_busy(&self) -> bool {
        matches!(self, OrderStatus::DriverAccepted | OrderStatus::InProgress)
    }

    pub fn charges_cancellation_fee(&self) -> bool {
        matches!(self, OrderStatus::Dispatched | OrderStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub client_id: Uuid,
    pub pickup: Address,
    pub delivery: Address,
    pub formula: Formula,
    pub package_description: Option<String>,
    pub notes: Option<String>,
    pub scheduled_pickup_at: Option<DateTime<Utc>>,
    pub price: f64,
    pub driver_id: Option<Uuid>,
    pub refusal_count: u32,
    pub last_refused_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub driver_accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
