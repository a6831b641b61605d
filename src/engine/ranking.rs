use std::cmp::Ordering;

use serde::Serialize;
use uuid::Uuid;

use crate::engine::orders;
use crate::error::AppError;
use crate::geo::{eta_minutes, haversine_km};
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::state::AppState;

/// A driver offered in the dispatch modal.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub driver: Driver,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<u32>,
    pub active_orders: usize,
}

pub fn candidate(driver: Driver, pickup: Option<&GeoPoint>, active_orders: usize) -> Candidate {
    let distance_km = match (driver.location.as_ref(), pickup) {
        (Some(from), Some(to)) => Some(haversine_km(from, to)),
        _ => None,
    };

    Candidate {
        driver,
        distance_km,
        eta_minutes: distance_km.map(eta_minutes),
        active_orders,
    }
}

/// Nearest first, unknown distance last, better rating wins a tie.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    let by_distance = match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_distance.then_with(|| b.driver.rating.total_cmp(&a.driver.rating))
}

pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare);
    candidates
}

pub fn candidates_for_order(state: &AppState, order_id: Uuid) -> Result<Vec<Candidate>, AppError> {
    let order = orders::get_order(state, order_id)?;

    let online: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| entry.value().status == DriverStatus::Online)
        .map(|entry| entry.value().clone())
        .collect();

    let candidates = online
        .into_iter()
        .map(|driver| {
            let active = state
                .orders
                .iter()
                .filter(|entry| {
                    entry.value().driver_id == Some(driver.id) && entry.value().status.is_on_driver()
                })
                .count();
            candidate(driver, order.pickup.location.as_ref(), active)
        })
        .collect();

    Ok(rank_candidates(candidates))
}
