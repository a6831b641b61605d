use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::change::{ChangeKind, Table};
use crate::models::driver::{
    DocumentsStatus, Driver, DriverDocuments, DriverStatus, GeoPoint, Vehicle,
};
use crate::models::event::Actor;
use crate::state::AppState;

pub struct NewDriver {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub vehicle: Option<Vehicle>,
}

pub fn create_driver(state: &AppState, new: NewDriver) -> Result<Driver, AppError> {
    let email = new.email.trim().to_lowercase();
    let taken = state
        .drivers
        .iter()
        .any(|entry| entry.value().email == email);
    if taken {
        return Err(AppError::Conflict(format!("driver email already used: {email}")));
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        email,
        phone: new.phone,
        status: DriverStatus::Offline,
        location: None,
        location_updated_at: None,
        vehicle: new.vehicle,
        rating: 5.0,
        total_deliveries: 0,
        documents: DriverDocuments::default(),
        created_at: now,
        updated_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    state.publish(Table::Drivers, ChangeKind::Insert, Some(driver.id));
    info!(driver_id = %driver.id, "driver created");

    Ok(driver)
}

pub fn get_driver(state: &AppState, id: Uuid) -> Result<Driver, AppError> {
    state
        .drivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
}

pub fn list_drivers(state: &AppState, status: Option<DriverStatus>) -> Vec<Driver> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
        .map(|entry| entry.value().clone())
        .collect();

    drivers.sort_by(|a, b| {
        a.last_name
            .cmp(&b.last_name)
            .then_with(|| a.first_name.cmp(&b.first_name))
    });
    drivers
}

/// Single-row update of the driver table.
pub fn update_driver<F>(state: &AppState, id: Uuid, apply: F) -> Result<Driver, AppError>
where
    F: FnOnce(&mut Driver) -> Result<(), AppError>,
{
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    apply(&mut driver)?;
    driver.updated_at = Utc::now();
    let updated = driver.clone();
    drop(driver);

    state.publish(Table::Drivers, ChangeKind::Update, Some(id));
    Ok(updated)
}

pub fn set_status(state: &AppState, id: Uuid, status: DriverStatus) -> Result<Driver, AppError> {
    update_driver(state, id, |driver| {
        driver.status = status;
        Ok(())
    })
}

pub fn update_location(state: &AppState, id: Uuid, location: GeoPoint) -> Result<Driver, AppError> {
    if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    update_driver(state, id, |driver| {
        driver.location = Some(location);
        driver.location_updated_at = Some(Utc::now());
        Ok(())
    })
}

pub fn submit_documents(state: &AppState, id: Uuid) -> Result<Driver, AppError> {
    update_driver(state, id, |driver| {
        if driver.documents.status == DocumentsStatus::Approved {
            return Err(AppError::Conflict("documents already approved".to_string()));
        }
        driver.documents.status = DocumentsStatus::Pending;
        driver.documents.submitted_at = Some(Utc::now());
        Ok(())
    })
}

pub fn approve_documents(
    state: &AppState,
    id: Uuid,
    admin: &Actor,
    notes: Option<String>,
) -> Result<Driver, AppError> {
    let driver = update_driver(state, id, |driver| {
        driver.documents.status = DocumentsStatus::Approved;
        driver.documents.validated_at = Some(Utc::now());
        driver.documents.validated_by = admin.id;
        driver.documents.notes = notes;
        Ok(())
    })?;

    info!(driver_id = %id, "driver documents approved");
    Ok(driver)
}

pub fn reject_documents(
    state: &AppState,
    id: Uuid,
    admin: &Actor,
    reason: &str,
) -> Result<Driver, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::BadRequest("a rejection reason is required".to_string()));
    }

    let driver = update_driver(state, id, |driver| {
        driver.documents.status = DocumentsStatus::Rejected;
        driver.documents.validated_at = Some(Utc::now());
        driver.documents.validated_by = admin.id;
        driver.documents.notes = Some(reason.trim().to_string());
        Ok(())
    })?;

    info!(driver_id = %id, "driver documents rejected");
    Ok(driver)
}
