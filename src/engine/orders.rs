use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::pricing::{self, PricingConfig, TariffTable};
use crate::engine::{drivers, events, notifier, references};
use crate::error::AppError;
use crate::geo::fallback_distance_meters;
use crate::models::change::{ChangeKind, Table};
use crate::models::client::ClientStatus;
use crate::models::driver::DriverStatus;
use crate::models::event::{Actor, ActorType, OrderEventType};
use crate::models::notification::NotificationKind;
use crate::models::order::{Address, Formula, Order, OrderStatus};
use crate::state::AppState;

/// The normal formula cannot be booked for a pickup closer than this.
pub const MINIMUM_SCHEDULE_DELAY_MINUTES: i64 = 60;

pub struct NewOrder {
    pub client_id: Uuid,
    pub pickup: Address,
    pub delivery: Address,
    pub formula: Formula,
    pub package_description: Option<String>,
    pub notes: Option<String>,
    pub scheduled_pickup_at: Option<DateTime<Utc>>,
    pub distance_meters: Option<f64>,
    pub price_override: Option<f64>,
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub client_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Refusal {
    pub driver_id: Option<Uuid>,
    pub driver_name: String,
    pub refused_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefusalHistory {
    pub order_id: Uuid,
    pub refusal_count: usize,
    pub refused_by: Vec<Refusal>,
}

pub fn get_order(state: &AppState, id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

/// Single-row update of the order table: the closure validates and mutates
/// under the row lock, nothing else is touched.
pub fn update_order<F>(state: &AppState, id: Uuid, apply: F) -> Result<Order, AppError>
where
    F: FnOnce(&mut Order) -> Result<(), AppError>,
{
    let mut order = state
        .orders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    apply(&mut order)?;
    order.updated_at = Utc::now();
    let updated = order.clone();
    drop(order);

    state.publish(Table::Orders, ChangeKind::Update, Some(id));
    Ok(updated)
}

fn insert_order(state: &AppState, order: Order) {
    let id = order.id;
    state.orders.insert(id, order);
    state.publish(Table::Orders, ChangeKind::Insert, Some(id));
}

/// Suspended clients cannot place new orders.
fn ensure_client_active(state: &AppState, client_id: Uuid) -> Result<(), AppError> {
    let client = state
        .clients
        .get(&client_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("client {client_id} not found")))?;
    if client.status == ClientStatus::Suspended {
        return Err(AppError::Forbidden(format!(
            "client {} is suspended",
            client.company_name
        )));
    }
    Ok(())
}

pub fn create_order(state: &AppState, new: NewOrder, actor: &Actor) -> Result<Order, AppError> {
    ensure_client_active(state, new.client_id)?;

    let now = Utc::now();
    if let Some(scheduled) = new.scheduled_pickup_at {
        if scheduled <= now {
            return Err(AppError::BadRequest(
                "scheduled pickup must be in the future".to_string(),
            ));
        }
        let notice = scheduled - now;
        if new.formula == Formula::Normal
            && notice < Duration::minutes(MINIMUM_SCHEDULE_DELAY_MINUTES)
        {
            return Err(AppError::BadRequest(format!(
                "the normal formula needs {MINIMUM_SCHEDULE_DELAY_MINUTES} minutes notice"
            )));
        }
    }

    let price = match new.price_override {
        Some(_) if !actor.is_admin() => {
            return Err(AppError::Forbidden(
                "only an admin can set an explicit price".to_string(),
            ));
        }
        Some(price) if !price.is_finite() || price < 0.0 => {
            return Err(AppError::BadRequest("price must be positive".to_string()));
        }
        Some(price) => price,
        None => {
            let distance = new.distance_meters.unwrap_or_else(|| {
                fallback_distance_meters(new.pickup.location.as_ref(), new.delivery.location.as_ref())
            });
            pricing::quote(
                TariffTable::embedded(),
                &new.pickup.city,
                &new.delivery.city,
                distance,
                new.formula,
                &PricingConfig::resolve(state),
            )?
            .total_eur
        }
    };

    let order = Order {
        id: Uuid::new_v4(),
        reference: references::order_reference(now),
        status: OrderStatus::PendingAcceptance,
        client_id: new.client_id,
        pickup: new.pickup,
        delivery: new.delivery,
        formula: new.formula,
        package_description: new.package_description,
        notes: new.notes,
        scheduled_pickup_at: new.scheduled_pickup_at,
        price,
        driver_id: None,
        refusal_count: 0,
        last_refused_by: None,
        cancellation_reason: None,
        cancellation_fee: None,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        dispatched_at: None,
        driver_accepted_at: None,
        started_at: None,
        delivered_at: None,
        cancelled_at: None,
    };

    insert_order(state, order.clone());
    events::record(
        state,
        order.id,
        OrderEventType::Created,
        "Order created",
        actor,
        json!({ "reference": order.reference, "price": order.price }),
    );
    info!(order_id = %order.id, reference = %order.reference, price = order.price, "order created");

    Ok(order)
}

pub fn accept_order(state: &AppState, id: Uuid, actor: &Actor) -> Result<Order, AppError> {
    let order = update_order(state, id, |order| {
        if order.status != OrderStatus::PendingAcceptance {
            return Err(AppError::Conflict(format!(
                "order is {}, only pending orders can be accepted",
                order.status.as_str()
            )));
        }
        order.status = OrderStatus::Accepted;
        order.accepted_at = Some(Utc::now());
        Ok(())
    })?;

    events::record(state, id, OrderEventType::Accepted, "Order accepted", actor, json!({}));
    Ok(order)
}

/// Puts a driver back online unless another order still keeps it busy.
/// Returns whether the driver was released.
pub fn release_driver_if_idle(
    state: &AppState,
    driver_id: Uuid,
    except_order: Uuid,
) -> Result<bool, AppError> {
    let still_busy = state.orders.iter().any(|entry| {
        let order = entry.value();
        order.id != except_order
            && order.driver_id == Some(driver_id)
            && order.status.keeps_driver_busy()
    });
    if still_busy {
        return Ok(false);
    }

    drivers::update_driver(state, driver_id, |driver| {
        if driver.status == DriverStatus::Busy {
            driver.status = DriverStatus::Online;
        }
        Ok(())
    })?;
    Ok(true)
}

pub fn unassign_order(
    state: &AppState,
    id: Uuid,
    reason: Option<String>,
    actor: &Actor,
) -> Result<Order, AppError> {
    let mut previous_driver = None;
    let order = update_order(state, id, |order| {
        if !order.status.is_on_driver() {
            return Err(AppError::Conflict(format!(
                "order is {}, nothing to unassign",
                order.status.as_str()
            )));
        }
        previous_driver = order.driver_id.take();
        order.status = OrderStatus::Accepted;
        order.dispatched_at = None;
        order.driver_accepted_at = None;
        Ok(())
    })?;

    if let Some(driver_id) = previous_driver {
        if let Err(err) = release_driver_if_idle(state, driver_id, id) {
            warn!(order_id = %id, driver_id = %driver_id, error = %err, "could not release driver after unassign");
        }
        notifier::notify(
            state,
            driver_id,
            NotificationKind::OrderUnassigned,
            "Delivery withdrawn",
            format!("Reference: {}", order.reference),
            json!({ "order_id": id }),
        );
    }

    events::record(
        state,
        id,
        OrderEventType::Unassigned,
        reason.unwrap_or_else(|| "Order unassigned by admin".to_string()),
        actor,
        json!({ "previous_driver_id": previous_driver }),
    );
    info!(order_id = %id, "order unassigned");

    Ok(order)
}

pub fn cancel_order(
    state: &AppState,
    id: Uuid,
    reason: String,
    actor: &Actor,
) -> Result<Order, AppError> {
    let current = get_order(state, id)?;
    if actor.actor_type == ActorType::Client && actor.id != Some(current.client_id) {
        return Err(AppError::Forbidden("not your order".to_string()));
    }

    let fee = state.rules.cancellation_fee_eur;
    let mut released_driver = None;
    let order = update_order(state, id, |order| {
        if !order.status.can_cancel() {
            return Err(AppError::Conflict(format!(
                "order is {}, it cannot be cancelled",
                order.status.as_str()
            )));
        }
        order.cancellation_fee = Some(if order.status.charges_cancellation_fee() {
            fee
        } else {
            0.0
        });
        order.cancellation_reason = Some(reason.clone());
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(Utc::now());
        released_driver = order.driver_id;
        Ok(())
    })?;

    if let Some(driver_id) = released_driver {
        if let Err(err) = release_driver_if_idle(state, driver_id, id) {
            warn!(order_id = %id, driver_id = %driver_id, error = %err, "could not release driver after cancel");
        }
    }

    events::record(
        state,
        id,
        OrderEventType::Cancelled,
        format!("Order cancelled: {reason}"),
        actor,
        json!({ "cancellation_fee": order.cancellation_fee }),
    );
    info!(order_id = %id, fee = ?order.cancellation_fee, "order cancelled");

    Ok(order)
}

pub fn duplicate_order(state: &AppState, id: Uuid, actor: &Actor) -> Result<Order, AppError> {
    let original = get_order(state, id)?;
    if actor.actor_type == ActorType::Client && actor.id != Some(original.client_id) {
        return Err(AppError::Forbidden("not your order".to_string()));
    }
    ensure_client_active(state, original.client_id)?;

    let original_reference = original.reference.clone();
    let now = Utc::now();
    let copy = Order {
        id: Uuid::new_v4(),
        reference: references::order_reference(now),
        status: OrderStatus::PendingAcceptance,
        scheduled_pickup_at: None,
        driver_id: None,
        refusal_count: 0,
        last_refused_by: None,
        cancellation_reason: None,
        cancellation_fee: None,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        dispatched_at: None,
        driver_accepted_at: None,
        started_at: None,
        delivered_at: None,
        cancelled_at: None,
        ..original
    };

    insert_order(state, copy.clone());
    events::record(
        state,
        copy.id,
        OrderEventType::Created,
        format!("Order duplicated from {original_reference}"),
        actor,
        json!({ "duplicated_from": id }),
    );

    Ok(copy)
}

pub fn list_orders(state: &AppState, filter: &OrderFilter) -> Vec<Order> {
    let needle = filter
        .search
        .as_ref()
        .map(|text| text.trim().to_lowercase())
        .filter(|text| !text.is_empty());

    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|order| filter.status.is_none_or(|status| order.status == status))
        .filter(|order| filter.client_id.is_none_or(|id| order.client_id == id))
        .filter(|order| filter.driver_id.is_none_or(|id| order.driver_id == Some(id)))
        .filter(|order| {
            needle.as_ref().is_none_or(|needle| {
                order.reference.to_lowercase().contains(needle)
                    || order.pickup.street.to_lowercase().contains(needle)
                    || order.delivery.street.to_lowercase().contains(needle)
                    || order.pickup.city.to_lowercase().contains(needle)
                    || order.delivery.city.to_lowercase().contains(needle)
            })
        })
        .collect();

    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

pub fn refusals(state: &AppState, id: Uuid) -> Result<RefusalHistory, AppError> {
    get_order(state, id)?;

    let mut refused_by: Vec<Refusal> = events::history(state, id)
        .into_iter()
        .filter(|event| event.event_type == OrderEventType::DriverDeclined)
        .map(|event| Refusal {
            driver_id: event.actor_id,
            driver_name: event
                .actor_id
                .and_then(|driver_id| state.drivers.get(&driver_id).map(|d| d.full_name()))
                .unwrap_or_else(|| "unknown driver".to_string()),
            refused_at: event.created_at,
        })
        .collect();
    refused_by.reverse();

    Ok(RefusalHistory {
        order_id: id,
        refusal_count: refused_by.len(),
        refused_by,
    })
}
