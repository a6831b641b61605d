use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Online,
    Busy,
    Offline,
    Suspended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    Bike,
    Scooter,
    Motorbike,
    Car,
    Van,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub kind: VehicleKind,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub plate_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentsStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDocuments {
    pub status: DocumentsStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<Uuid>,
    pub notes: Option<String>,
}

impl Default for DriverDocuments {
    fn default() -> Self {
        Self {
            status: DocumentsStatus::NotSubmitted,
            submitted_at: None,
            validated_at: None,
            validated_by: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub vehicle: Option<Vehicle>,
    pub rating: f64,
    pub total_deliveries: u32,
    pub documents: DriverDocuments,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
