//! Admin dispatch: assign an order to a driver.
//!
//! The assignment is three independent writes (order row, driver row, audit
//! row) plus a queued notification. Nothing wraps them: once the order row is
//! written, later failures are logged and the call still succeeds.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{drivers, events, notifier, orders};
use crate::error::AppError;
use crate::models::driver::DriverStatus;
use crate::models::event::{Actor, OrderEventType};
use crate::models::notification::NotificationKind;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Earliest time a scheduled order may be dispatched.
pub fn dispatch_unlock_time(
    scheduled_pickup_at: DateTime<Utc>,
    advance_minutes: i64,
) -> DateTime<Utc> {
    scheduled_pickup_at - Duration::minutes(advance_minutes)
}

pub fn is_dispatch_locked(order: &Order, advance_minutes: i64, now: DateTime<Utc>) -> bool {
    order
        .scheduled_pickup_at
        .is_some_and(|scheduled| now < dispatch_unlock_time(scheduled, advance_minutes))
}

pub fn dispatch_order(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    actor: &Actor,
) -> Result<Order, AppError> {
    let start = Instant::now();
    let result = assign(state, order_id, driver_id, actor);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .dispatch_attempts_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn assign(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    actor: &Actor,
) -> Result<Order, AppError> {
    let current = orders::get_order(state, order_id)?;
    let advance = state.rules.dispatch_advance_minutes;
    if is_dispatch_locked(&current, advance, Utc::now()) {
        let unlock = current
            .scheduled_pickup_at
            .map(|scheduled| dispatch_unlock_time(scheduled, advance));
        return Err(AppError::Conflict(format!(
            "scheduled order, dispatch unlocks at {}",
            unlock.map(|at| at.to_rfc3339()).unwrap_or_default()
        )));
    }

    let driver = drivers::get_driver(state, driver_id)?;
    if driver.status == DriverStatus::Suspended {
        return Err(AppError::Conflict(format!(
            "driver {} is suspended",
            driver.full_name()
        )));
    }

    let order = orders::update_order(state, order_id, |order| {
        if !order.status.can_dispatch() {
            return Err(AppError::Conflict(format!(
                "order is {}, only accepted or refused orders can be dispatched",
                order.status.as_str()
            )));
        }
        order.driver_id = Some(driver_id);
        order.status = OrderStatus::Dispatched;
        order.dispatched_at = Some(Utc::now());
        Ok(())
    })?;

    if let Err(err) = drivers::set_status(state, driver_id, DriverStatus::Busy) {
        warn!(
            order_id = %order_id,
            driver_id = %driver_id,
            error = %err,
            "driver status update failed, order stays assigned to a driver not marked busy"
        );
    }

    events::record(
        state,
        order_id,
        OrderEventType::Dispatched,
        "Assigned by admin",
        actor,
        json!({ "driver_id": driver_id }),
    );

    notifier::notify(
        state,
        driver_id,
        NotificationKind::NewOrder,
        "New delivery",
        format!("Reference: {}", order.reference),
        json!({ "order_id": order_id }),
    );

    info!(
        order_id = %order_id,
        driver_id = %driver_id,
        reference = %order.reference,
        "order dispatched"
    );

    Ok(order)
}
