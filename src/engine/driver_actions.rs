use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{drivers, events, orders};
use crate::error::AppError;
use crate::models::driver::DriverStatus;
use crate::models::event::{Actor, OrderEventType};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

fn ensure_assigned(order: &Order, driver_id: Uuid) -> Result<(), AppError> {
    if order.driver_id != Some(driver_id) {
        return Err(AppError::Forbidden(format!(
            "order {} is not assigned to this driver",
            order.reference
        )));
    }
    Ok(())
}

fn wrong_status(order: &Order, action: &str) -> AppError {
    AppError::Conflict(format!(
        "cannot {action} an order that is {}",
        order.status.as_str()
    ))
}

pub fn accept(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    let order = orders::update_order(state, order_id, |order| {
        ensure_assigned(order, driver_id)?;
        if order.status != OrderStatus::Dispatched {
            return Err(wrong_status(order, "accept"));
        }
        order.status = OrderStatus::DriverAccepted;
        order.driver_accepted_at = Some(Utc::now());
        Ok(())
    })?;

    if let Err(err) = drivers::set_status(state, driver_id, DriverStatus::Busy) {
        warn!(order_id = %order_id, driver_id = %driver_id, error = %err, "driver status update failed after accept");
    }

    events::record(
        state,
        order_id,
        OrderEventType::DriverAccepted,
        "Driver accepted the delivery",
        &Actor::driver(driver_id),
        json!({}),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "driver accepted order");

    Ok(order)
}

/// Declining reads the refusal counter and writes it back incremented in a
/// second step. Two concurrent declines can lose an increment.
pub fn decline(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    reason: Option<String>,
) -> Result<Order, AppError> {
    let current = orders::get_order(state, order_id)?;
    ensure_assigned(&current, driver_id)?;
    if !matches!(
        current.status,
        OrderStatus::Dispatched | OrderStatus::DriverAccepted
    ) {
        return Err(wrong_status(&current, "decline"));
    }

    let refusal_count = current.refusal_count + 1;
    let driver_name = state
        .drivers
        .get(&driver_id)
        .map(|driver| driver.full_name())
        .unwrap_or_else(|| "unknown driver".to_string());

    let order = record_refusal(state, order_id, driver_id, refusal_count, &driver_name)?;

    if let Err(err) = drivers::set_status(state, driver_id, DriverStatus::Online) {
        warn!(order_id = %order_id, driver_id = %driver_id, error = %err, "driver status update failed after decline");
    }

    let description = match &reason {
        Some(reason) => format!("Declined by {driver_name}: {reason}"),
        None => format!("Declined by {driver_name}"),
    };
    events::record(
        state,
        order_id,
        OrderEventType::DriverDeclined,
        description,
        &Actor::driver(driver_id),
        json!({ "refusal_count": refusal_count, "reason": reason }),
    );
    info!(order_id = %order_id, driver_id = %driver_id, refusal_count, "driver declined order");

    Ok(order)
}

/// Writes the refusal with the counter computed from an earlier read. The
/// assignment is checked again: the order may have moved to another driver
/// since that read.
fn record_refusal(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    refusal_count: u32,
    driver_name: &str,
) -> Result<Order, AppError> {
    orders::update_order(state, order_id, |order| {
        ensure_assigned(order, driver_id)?;
        if !matches!(
            order.status,
            OrderStatus::Dispatched | OrderStatus::DriverAccepted
        ) {
            return Err(wrong_status(order, "decline"));
        }
        order.refusal_count = refusal_count;
        order.driver_id = None;
        order.dispatched_at = None;
        order.driver_accepted_at = None;
        order.last_refused_by = Some(driver_name.to_string());
        order.status = OrderStatus::DriverRefused;
        Ok(())
    })
}

pub fn start(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    let order = orders::update_order(state, order_id, |order| {
        ensure_assigned(order, driver_id)?;
        if order.status != OrderStatus::DriverAccepted {
            return Err(wrong_status(order, "start"));
        }
        order.status = OrderStatus::InProgress;
        order.started_at = Some(Utc::now());
        Ok(())
    })?;

    events::record(
        state,
        order_id,
        OrderEventType::InProgress,
        "Pickup done, delivery in progress",
        &Actor::driver(driver_id),
        json!({}),
    );

    Ok(order)
}

pub fn complete(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
    let order = orders::update_order(state, order_id, |order| {
        ensure_assigned(order, driver_id)?;
        if order.status != OrderStatus::InProgress {
            return Err(wrong_status(order, "complete"));
        }
        order.status = OrderStatus::Delivered;
        order.delivered_at = Some(Utc::now());
        Ok(())
    })?;

    let released = drivers::update_driver(state, driver_id, |driver| {
        driver.total_deliveries += 1;
        if driver.status == DriverStatus::Busy {
            driver.status = DriverStatus::Online;
        }
        Ok(())
    });
    if let Err(err) = released {
        warn!(order_id = %order_id, driver_id = %driver_id, error = %err, "driver update failed after delivery");
    }

    events::record(
        state,
        order_id,
        OrderEventType::Delivered,
        "Delivered",
        &Actor::driver(driver_id),
        json!({}),
    );
    info!(order_id = %order_id, driver_id = %driver_id, "order delivered");

    Ok(order)
}

pub fn active_orders(state: &AppState, driver_id: Uuid) -> Vec<Order> {
    let mut active: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.driver_id == Some(driver_id) && order.status.is_on_driver()
        })
        .map(|entry| entry.value().clone())
        .collect();

    active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    active
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{decline, record_refusal};
    use crate::config::BusinessRules;
    use crate::engine::clients::{self, NewClient};
    use crate::engine::dispatch::dispatch_order;
    use crate::engine::drivers::{self, NewDriver};
    use crate::engine::orders::{self, NewOrder};
    use crate::error::AppError;
    use crate::models::client::BillingAddress;
    use crate::models::driver::DriverStatus;
    use crate::models::event::Actor;
    use crate::models::order::{Address, Formula, OrderStatus};
    use crate::state::AppState;

    const ADMIN: Uuid = Uuid::from_u128(1);

    fn driver(state: &AppState, email: &str) -> Uuid {
        let driver = drivers::create_driver(
            state,
            NewDriver {
                first_name: "Sofiane".to_string(),
                last_name: "Martin".to_string(),
                email: email.to_string(),
                phone: "0611223344".to_string(),
                vehicle: None,
            },
        )
        .unwrap();
        drivers::set_status(state, driver.id, DriverStatus::Online).unwrap();
        driver.id
    }

    fn accepted_order(state: &AppState) -> Uuid {
        let client = clients::create_client(
            state,
            NewClient {
                company_name: "Atelier Nord".to_string(),
                contact_name: None,
                email: "atelier@example.com".to_string(),
                phone: None,
                billing: BillingAddress::default(),
            },
        )
        .unwrap();
        let address = |city: &str| Address {
            street: "1 rue de la Gare".to_string(),
            city: city.to_string(),
            location: None,
        };
        let admin = Actor::admin(ADMIN);
        let order = orders::create_order(
            state,
            NewOrder {
                client_id: client.id,
                pickup: address("Paris"),
                delivery: address("Melun"),
                formula: Formula::Normal,
                package_description: None,
                notes: None,
                scheduled_pickup_at: None,
                distance_meters: None,
                price_override: Some(50.0),
            },
            &admin,
        )
        .unwrap();
        orders::accept_order(state, order.id, &admin).unwrap();
        order.id
    }

    #[test]
    fn stale_refusal_leaves_the_new_assignment_alone() {
        let (state, _rx) = AppState::new(BusinessRules::default(), 16, 16);
        let first = driver(&state, "first@example.com");
        let second = driver(&state, "second@example.com");
        let order_id = accepted_order(&state);
        let admin = Actor::admin(ADMIN);

        dispatch_order(&state, order_id, first, &admin).unwrap();
        let count_read_by_first = orders::get_order(&state, order_id).unwrap().refusal_count + 1;

        orders::unassign_order(&state, order_id, None, &admin).unwrap();
        dispatch_order(&state, order_id, second, &admin).unwrap();

        let result = record_refusal(&state, order_id, first, count_read_by_first, "Sofiane Martin");
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let order = orders::get_order(&state, order_id).unwrap();
        assert_eq!(order.driver_id, Some(second));
        assert_eq!(order.status, OrderStatus::Dispatched);
        assert_eq!(order.refusal_count, 0);
        assert_eq!(drivers::get_driver(&state, second).unwrap().status, DriverStatus::Busy);
    }

    #[test]
    fn decline_counts_and_releases_the_order() {
        let (state, _rx) = AppState::new(BusinessRules::default(), 16, 16);
        let driver_id = driver(&state, "solo@example.com");
        let order_id = accepted_order(&state);
        dispatch_order(&state, order_id, driver_id, &Actor::admin(ADMIN)).unwrap();

        let order = decline(&state, order_id, driver_id, Some("too far".to_string())).unwrap();
        assert_eq!(order.status, OrderStatus::DriverRefused);
        assert_eq!(order.refusal_count, 1);
        assert_eq!(order.driver_id, None);
        assert_eq!(order.last_refused_by.as_deref(), Some("Sofiane Martin"));
    }
}
