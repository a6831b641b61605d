use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::references;
use crate::error::AppError;
use crate::models::change::{ChangeKind, Table};
use crate::models::client::{BillingAddress, Client, ClientStatus};
use crate::models::order::OrderStatus;
use crate::state::AppState;

pub struct NewClient {
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub billing: BillingAddress,
}

#[derive(Debug, Default)]
pub struct ClientChanges {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing: Option<BillingAddress>,
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub total_orders: usize,
    pub delivered_orders: usize,
    pub cancelled_orders: usize,
    pub active_orders: usize,
    pub total_spent: f64,
    pub total_invoiced: f64,
    pub total_paid: f64,
    pub total_unpaid: f64,
}

fn email_taken(state: &AppState, email: &str, except: Option<Uuid>) -> bool {
    state
        .clients
        .iter()
        .any(|entry| entry.value().email == email && Some(entry.value().id) != except)
}

pub fn create_client(state: &AppState, new: NewClient) -> Result<Client, AppError> {
    let email = new.email.trim().to_lowercase();
    if email_taken(state, &email, None) {
        return Err(AppError::Conflict(format!("client email already used: {email}")));
    }

    let now = Utc::now();
    let client = Client {
        id: Uuid::new_v4(),
        internal_code: references::client_code(),
        company_name: new.company_name.trim().to_string(),
        contact_name: new.contact_name,
        email,
        phone: new.phone,
        billing: new.billing,
        status: ClientStatus::Active,
        suspension_reason: None,
        created_at: now,
        updated_at: now,
    };

    state.clients.insert(client.id, client.clone());
    state.publish(Table::Clients, ChangeKind::Insert, Some(client.id));
    info!(client_id = %client.id, code = %client.internal_code, "client created");

    Ok(client)
}

pub fn get_client(state: &AppState, id: Uuid) -> Result<Client, AppError> {
    state
        .clients
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))
}

pub fn list_clients(state: &AppState, status: Option<ClientStatus>) -> Vec<Client> {
    let mut clients: Vec<Client> = state
        .clients
        .iter()
        .filter(|entry| status.is_none_or(|wanted| entry.value().status == wanted))
        .map(|entry| entry.value().clone())
        .collect();

    clients.sort_by(|a, b| a.company_name.to_lowercase().cmp(&b.company_name.to_lowercase()));
    clients
}

fn update_client<F>(state: &AppState, id: Uuid, apply: F) -> Result<Client, AppError>
where
    F: FnOnce(&mut Client) -> Result<(), AppError>,
{
    let mut client = state
        .clients
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))?;

    apply(&mut client)?;
    client.updated_at = Utc::now();
    let updated = client.clone();
    drop(client);

    state.publish(Table::Clients, ChangeKind::Update, Some(id));
    Ok(updated)
}

pub fn apply_changes(state: &AppState, id: Uuid, changes: ClientChanges) -> Result<Client, AppError> {
    let email = changes.email.map(|email| email.trim().to_lowercase());
    if let Some(email) = &email {
        if email_taken(state, email, Some(id)) {
            return Err(AppError::Conflict(format!("client email already used: {email}")));
        }
    }

    update_client(state, id, |client| {
        if let Some(name) = changes.company_name {
            client.company_name = name.trim().to_string();
        }
        if let Some(contact) = changes.contact_name {
            client.contact_name = Some(contact);
        }
        if let Some(email) = email {
            client.email = email;
        }
        if let Some(phone) = changes.phone {
            client.phone = Some(phone);
        }
        if let Some(billing) = changes.billing {
            client.billing = billing;
        }
        if let Some(status) = changes.status {
            client.status = status;
            if status != ClientStatus::Suspended {
                client.suspension_reason = None;
            }
        }
        Ok(())
    })
}

pub fn suspend(state: &AppState, id: Uuid, reason: Option<String>) -> Result<Client, AppError> {
    let client = update_client(state, id, |client| {
        client.status = ClientStatus::Suspended;
        client.suspension_reason = reason;
        Ok(())
    })?;

    info!(client_id = %id, "client suspended");
    Ok(client)
}

pub fn unsuspend(state: &AppState, id: Uuid) -> Result<Client, AppError> {
    update_client(state, id, |client| {
        if client.status != ClientStatus::Suspended {
            return Err(AppError::Conflict("client is not suspended".to_string()));
        }
        client.status = ClientStatus::Active;
        client.suspension_reason = None;
        Ok(())
    })
}

pub fn stats(state: &AppState, id: Uuid) -> Result<ClientStats, AppError> {
    get_client(state, id)?;

    let mut stats = ClientStats {
        total_orders: 0,
        delivered_orders: 0,
        cancelled_orders: 0,
        active_orders: 0,
        total_spent: 0.0,
        total_invoiced: 0.0,
        total_paid: 0.0,
        total_unpaid: 0.0,
    };

    for entry in state.orders.iter() {
        let order = entry.value();
        if order.client_id != id {
            continue;
        }
        stats.total_orders += 1;
        match order.status {
            OrderStatus::Delivered => {
                stats.delivered_orders += 1;
                stats.total_spent += order.price;
            }
            OrderStatus::Cancelled => stats.cancelled_orders += 1,
            _ => stats.active_orders += 1,
        }
    }

    for entry in state.invoices.iter() {
        let invoice = entry.value();
        if invoice.client_id != id {
            continue;
        }
        stats.total_invoiced += invoice.amount_ttc;
        if invoice.status.is_unpaid() {
            stats.total_unpaid += invoice.amount_ttc;
        } else {
            stats.total_paid += invoice.amount_ttc;
        }
    }

    Ok(stats)
}
