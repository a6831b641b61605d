use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::BusinessRules;
use crate::models::change::{ChangeEvent, ChangeKind, Table};
use crate::models::client::Client;
use crate::models::driver::Driver;
use crate::models::event::OrderEvent;
use crate::models::invoice::Invoice;
use crate::models::message::{Complaint, Message, Thread};
use crate::models::notification::Notification;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

/// The hosted tables. Every map is one table; a write to one row never
/// spans another row or table.
pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    pub drivers: DashMap<Uuid, Driver>,
    pub clients: DashMap<Uuid, Client>,
    pub invoices: DashMap<Uuid, Invoice>,
    pub order_events: DashMap<Uuid, OrderEvent>,
    pub threads: DashMap<Uuid, Thread>,
    pub messages: DashMap<Uuid, Message>,
    pub complaints: DashMap<Uuid, Complaint>,
    pub notifications: DashMap<Uuid, Notification>,
    pub settings: DashMap<String, String>,
    pub rules: BusinessRules,
    pub notification_tx: mpsc::Sender<Notification>,
    pub changes_tx: broadcast::Sender<ChangeEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        rules: BusinessRules,
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notification_tx, notification_rx) = mpsc::channel(notification_queue_size);
        let (changes_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                orders: DashMap::new(),
                drivers: DashMap::new(),
                clients: DashMap::new(),
                invoices: DashMap::new(),
                order_events: DashMap::new(),
                threads: DashMap::new(),
                messages: DashMap::new(),
                complaints: DashMap::new(),
                notifications: DashMap::new(),
                settings: DashMap::new(),
                rules,
                notification_tx,
                changes_tx,
                metrics: Metrics::new(),
            },
            notification_rx,
        )
    }

    /// Publishes a row change. Having no subscriber is not an error.
    pub fn publish(&self, table: Table, kind: ChangeKind, id: Option<Uuid>) {
        let _ = self.changes_tx.send(ChangeEvent {
            table,
            kind,
            id,
            at: Utc::now(),
        });
    }
}
