//! Monthly invoices, payment tracking and the overdue sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::pricing::round_to;
use crate::engine::{clients, notifier, references};
use crate::error::AppError;
use crate::models::change::{ChangeKind, Table};
use crate::models::invoice::{Invoice, InvoiceStatus};
use crate::models::notification::NotificationKind;
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Day of the following month on which an invoice falls due.
pub const DUE_DAY: u32 = 15;

#[derive(Debug, Clone, Serialize)]
pub struct ReminderSummary {
    pub clients_reminded: usize,
    pub invoices_unpaid: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amounts {
    pub ht: f64,
    pub tva: f64,
    pub ttc: f64,
}

pub fn amounts(ht: f64, vat_rate: f64) -> Amounts {
    let ht = round_to(ht, 2);
    let tva = round_to(ht * vat_rate, 2);
    Amounts {
        ht,
        tva,
        ttc: round_to(ht + tva, 2),
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Midnight UTC on the 15th of the month after the billed one.
pub fn due_date(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let (due_year, due_month) = next_month(year, month);
    let date = NaiveDate::from_ymd_opt(due_year, due_month, DUE_DAY)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

pub fn generate_monthly(
    state: &AppState,
    client_id: Uuid,
    year: i32,
    month: u32,
) -> Result<Invoice, AppError> {
    if !(1..=12).contains(&month) {
        return Err(AppError::BadRequest(format!("invalid month: {month}")));
    }
    let client = clients::get_client(state, client_id)?;

    let reference = references::invoice_reference(year, month, client_id);
    let exists = state
        .invoices
        .iter()
        .any(|entry| entry.value().reference == reference);
    if exists {
        return Err(AppError::Conflict(format!("invoice {reference} already exists")));
    }

    let invalid_period = || AppError::BadRequest(format!("invalid period {year}-{month:02}"));
    let (end_year, end_month) = next_month(year, month);
    let start = month_start(year, month).ok_or_else(invalid_period)?;
    let end = month_start(end_year, end_month).ok_or_else(invalid_period)?;
    let due = due_date(year, month).ok_or_else(invalid_period)?;

    let (order_count, total_ht) = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.client_id == client_id
                && order.status == OrderStatus::Delivered
                && order
                    .delivered_at
                    .is_some_and(|at| at >= start && at < end)
        })
        .fold((0usize, 0.0f64), |(count, sum), entry| {
            (count + 1, sum + entry.value().price)
        });

    if order_count == 0 {
        return Err(AppError::BadRequest(format!(
            "no delivered orders for {} in {year}-{month:02}",
            client.company_name
        )));
    }

    let totals = amounts(total_ht, state.rules.vat_rate);
    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        reference,
        client_id,
        month,
        year,
        order_count,
        amount_ht: totals.ht,
        amount_tva: totals.tva,
        amount_ttc: totals.ttc,
        status: InvoiceStatus::Pending,
        due_date: due,
        paid_at: None,
        created_at: now,
        updated_at: now,
    };

    state.invoices.insert(invoice.id, invoice.clone());
    state.publish(Table::Invoices, ChangeKind::Insert, Some(invoice.id));
    info!(
        invoice_id = %invoice.id,
        reference = %invoice.reference,
        client_id = %client_id,
        amount_ttc = invoice.amount_ttc,
        "invoice generated"
    );

    Ok(invoice)
}

pub fn get_invoice(state: &AppState, id: Uuid) -> Result<Invoice, AppError> {
    state
        .invoices
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("invoice {id} not found")))
}

pub fn list_invoices(
    state: &AppState,
    status: Option<InvoiceStatus>,
    client_id: Option<Uuid>,
) -> Vec<Invoice> {
    let mut invoices: Vec<Invoice> = state
        .invoices
        .iter()
        .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
        .filter(|entry| client_id.is_none_or(|id| entry.value().client_id == id))
        .map(|entry| entry.value().clone())
        .collect();

    invoices.sort_by(|a, b| {
        (b.year, b.month)
            .cmp(&(a.year, a.month))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    invoices
}

pub fn mark_paid(state: &AppState, id: Uuid) -> Result<Invoice, AppError> {
    let mut invoice = state
        .invoices
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("invoice {id} not found")))?;

    if invoice.status == InvoiceStatus::Paid {
        return Err(AppError::Conflict(format!(
            "invoice {} is already paid",
            invoice.reference
        )));
    }
    let now = Utc::now();
    invoice.status = InvoiceStatus::Paid;
    invoice.paid_at = Some(now);
    invoice.updated_at = now;
    let paid = invoice.clone();
    drop(invoice);

    state.publish(Table::Invoices, ChangeKind::Update, Some(id));
    notifier::notify(
        state,
        paid.client_id,
        NotificationKind::PaymentConfirmed,
        "Payment received",
        format!(
            "Invoice {} ({:.2} EUR) has been paid",
            paid.reference, paid.amount_ttc
        ),
        json!({ "invoice_id": id }),
    );
    info!(invoice_id = %id, reference = %paid.reference, "invoice paid");

    Ok(paid)
}

/// Moves pending invoices past their due date to overdue. Returns how many
/// were moved.
pub fn sweep_overdue(state: &AppState, now: DateTime<Utc>) -> usize {
    let mut moved = Vec::new();
    for mut entry in state.invoices.iter_mut() {
        let invoice = entry.value_mut();
        if invoice.status == InvoiceStatus::Pending && invoice.due_date < now {
            invoice.status = InvoiceStatus::Overdue;
            invoice.updated_at = now;
            moved.push(invoice.id);
        }
    }

    for id in &moved {
        state.publish(Table::Invoices, ChangeKind::Update, Some(*id));
    }
    state.metrics.invoices_marked_overdue_total.inc_by(moved.len() as u64);
    moved.len()
}

pub async fn run_overdue_sweep(state: Arc<AppState>, period: Duration) {
    info!(period_secs = period.as_secs(), "overdue sweep started");
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        let moved = sweep_overdue(&state, Utc::now());
        if moved > 0 {
            warn!(count = moved, "invoices marked overdue");
        }
    }
}

/// One reminder per client that still has unpaid invoices.
pub fn send_payment_reminders(state: &AppState) -> ReminderSummary {
    let unpaid: Vec<Invoice> = state
        .invoices
        .iter()
        .filter(|entry| entry.value().status.is_unpaid())
        .map(|entry| entry.value().clone())
        .collect();

    let mut per_client: Vec<(Uuid, Vec<&Invoice>)> = Vec::new();
    for invoice in &unpaid {
        match per_client.iter_mut().find(|(id, _)| *id == invoice.client_id) {
            Some((_, invoices)) => invoices.push(invoice),
            None => per_client.push((invoice.client_id, vec![invoice])),
        }
    }

    for (client_id, invoices) in &per_client {
        let total: f64 = invoices.iter().map(|invoice| invoice.amount_ttc).sum();
        let references: Vec<&str> = invoices.iter().map(|i| i.reference.as_str()).collect();
        notifier::notify(
            state,
            *client_id,
            NotificationKind::PaymentReminder,
            "Payment reminder",
            format!(
                "{} unpaid invoice(s), {:.2} EUR due",
                invoices.len(),
                round_to(total, 2)
            ),
            json!({ "invoices": references }),
        );
    }

    info!(clients = per_client.len(), invoices = unpaid.len(), "payment reminders sent");
    ReminderSummary {
        clients_reminded: per_client.len(),
        invoices_unpaid: unpaid.len(),
    }
}
