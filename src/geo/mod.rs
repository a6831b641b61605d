use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Average courier speed in town, used for the ETA shown next to candidates.
pub const URBAN_SPEED_KMH: f64 = 30.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    2.0 * EARTH_RADIUS_KM * haversine.sqrt().asin()
}

pub fn eta_minutes(distance_km: f64) -> u32 {
    ((distance_km.max(0.0) / URBAN_SPEED_KMH) * 60.0).round() as u32
}

/// Straight-line fallback when no road distance was supplied with the order.
pub fn fallback_distance_meters(pickup: Option<&GeoPoint>, delivery: Option<&GeoPoint>) -> f64 {
    match (pickup, delivery) {
        (Some(a), Some(b)) => haversine_km(a, b) * 1000.0,
        _ => 0.0,
    }
}
