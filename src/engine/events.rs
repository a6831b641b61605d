use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::change::{ChangeKind, Table};
use crate::models::event::{Actor, OrderEvent, OrderEventType};
use crate::state::AppState;

/// Inserts one row in the audit log of an order.
pub fn record(
    state: &AppState,
    order_id: Uuid,
    event_type: OrderEventType,
    description: impl Into<String>,
    actor: &Actor,
    metadata: Value,
) -> OrderEvent {
    let event = OrderEvent {
        id: Uuid::new_v4(),
        order_id,
        event_type,
        description: description.into(),
        actor_type: actor.actor_type,
        actor_id: actor.id,
        metadata,
        created_at: Utc::now(),
    };

    state.order_events.insert(event.id, event.clone());
    state
        .metrics
        .order_events_total
        .with_label_values(&[event_type.as_str()])
        .inc();
    state.publish(Table::OrderEvents, ChangeKind::Insert, Some(event.id));

    event
}

/// Audit history of one order, oldest first.
pub fn history(state: &AppState, order_id: Uuid) -> Vec<OrderEvent> {
    let mut events: Vec<OrderEvent> = state
        .order_events
        .iter()
        .filter(|entry| entry.value().order_id == order_id)
        .map(|entry| entry.value().clone())
        .collect();

    events.sort_by_key(|event| event.created_at);
    events
}
