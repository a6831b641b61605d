use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::pricing::round_to;
use crate::models::client::ClientStatus;
use crate::models::driver::DriverStatus;
use crate::models::invoice::InvoiceStatus;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub orders_total: usize,
    pub orders_by_status: BTreeMap<&'static str, usize>,
    pub drivers_total: usize,
    pub drivers_online: usize,
    pub drivers_busy: usize,
    pub clients_total: usize,
    pub clients_active: usize,
    pub clients_suspended: usize,
    pub invoices_total: usize,
    pub invoices_pending: usize,
    pub invoices_overdue: usize,
    pub invoiced_amount: f64,
    pub pending_amount: f64,
    pub revenue_delivered: f64,
}

pub fn admin_stats(state: &AppState) -> AdminStats {
    let mut orders_by_status: BTreeMap<&'static str, usize> =
        OrderStatus::ALL.iter().map(|status| (status.as_str(), 0)).collect();
    let mut revenue_delivered = 0.0;
    for entry in state.orders.iter() {
        let order = entry.value();
        *orders_by_status.entry(order.status.as_str()).or_default() += 1;
        if order.status == OrderStatus::Delivered {
            revenue_delivered += order.price;
        }
    }

    let count_drivers = |status: DriverStatus| {
        state
            .drivers
            .iter()
            .filter(|entry| entry.value().status == status)
            .count()
    };
    let count_clients = |status: ClientStatus| {
        state
            .clients
            .iter()
            .filter(|entry| entry.value().status == status)
            .count()
    };

    let mut invoices_pending = 0;
    let mut invoices_overdue = 0;
    let mut invoiced_amount = 0.0;
    let mut pending_amount = 0.0;
    for entry in state.invoices.iter() {
        let invoice = entry.value();
        invoiced_amount += invoice.amount_ttc;
        match invoice.status {
            InvoiceStatus::Pending => invoices_pending += 1,
            InvoiceStatus::Overdue => invoices_overdue += 1,
            InvoiceStatus::Paid => {}
        }
        if invoice.status.is_unpaid() {
            pending_amount += invoice.amount_ttc;
        }
    }

    AdminStats {
        orders_total: state.orders.len(),
        orders_by_status,
        drivers_total: state.drivers.len(),
        drivers_online: count_drivers(DriverStatus::Online),
        drivers_busy: count_drivers(DriverStatus::Busy),
        clients_total: state.clients.len(),
        clients_active: count_clients(ClientStatus::Active),
        clients_suspended: count_clients(ClientStatus::Suspended),
        invoices_total: state.invoices.len(),
        invoices_pending,
        invoices_overdue,
        invoiced_amount: round_to(invoiced_amount, 2),
        pending_amount: round_to(pending_amount, 2),
        revenue_delivered: round_to(revenue_delivered, 2),
    }
}
