use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::change::{ChangeKind, Table};
use crate::models::event::{Actor, ActorType};
use crate::models::message::{
    Complaint, Message, SenderType, Thread, ThreadKind, ThreadStatus,
};
use crate::state::AppState;

pub struct NewThread {
    pub client_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub subject: String,
    pub content: String,
}

pub struct NewComplaint {
    pub order_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub unread_count: usize,
}

fn sender_type(actor: &Actor) -> Result<SenderType, AppError> {
    match actor.actor_type {
        ActorType::Admin => Ok(SenderType::Admin),
        ActorType::Client => Ok(SenderType::Client),
        ActorType::Driver => Ok(SenderType::Driver),
        ActorType::System => Err(AppError::Forbidden(
            "system actors cannot post messages".to_string(),
        )),
    }
}

fn require_id(actor: &Actor) -> Result<Uuid, AppError> {
    actor
        .id
        .ok_or_else(|| AppError::Unauthorized("actor id required".to_string()))
}

fn can_access(thread: &Thread, actor: &Actor) -> bool {
    match actor.actor_type {
        ActorType::Admin | ActorType::System => true,
        ActorType::Client => actor.id.is_some() && thread.client_id == actor.id,
        ActorType::Driver => actor.id.is_some() && thread.driver_id == actor.id,
    }
}

/// Whether `reader` still has to read `message`: admins read everything the
/// other side wrote, clients and drivers read what admins wrote.
fn unread_by(message: &Message, reader: &Actor) -> bool {
    if message.is_read {
        return false;
    }
    match reader.actor_type {
        ActorType::Admin => message.sender_type != SenderType::Admin,
        _ => message.sender_type == SenderType::Admin,
    }
}

pub fn get_thread(state: &AppState, id: Uuid, actor: &Actor) -> Result<Thread, AppError> {
    let thread = state
        .threads
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("thread {id} not found")))?;

    if !can_access(&thread, actor) {
        return Err(AppError::Forbidden("not a participant of this thread".to_string()));
    }
    Ok(thread)
}

fn insert_thread(state: &AppState, thread: Thread) {
    let id = thread.id;
    state.threads.insert(id, thread);
    state.publish(Table::Threads, ChangeKind::Insert, Some(id));
}

fn insert_message(state: &AppState, message: Message) {
    let id = message.id;
    state.messages.insert(id, message);
    state.publish(Table::Messages, ChangeKind::Insert, Some(id));
}

fn touch_thread(state: &AppState, id: Uuid) {
    if let Some(mut thread) = state.threads.get_mut(&id) {
        thread.updated_at = Utc::now();
        drop(thread);
        state.publish(Table::Threads, ChangeKind::Update, Some(id));
    }
}

pub fn create_thread(state: &AppState, new: NewThread, actor: &Actor) -> Result<Thread, AppError> {
    if new.subject.trim().is_empty() || new.content.trim().is_empty() {
        return Err(AppError::BadRequest("subject and message are required".to_string()));
    }

    let (client_id, driver_id, kind) = match actor.actor_type {
        ActorType::Client => (Some(require_id(actor)?), None, ThreadKind::General),
        ActorType::Driver => (None, Some(require_id(actor)?), ThreadKind::DriverSupport),
        ActorType::Admin => match (new.client_id, new.driver_id) {
            (Some(client_id), None) => (Some(client_id), None, ThreadKind::General),
            (None, Some(driver_id)) => (None, Some(driver_id), ThreadKind::DriverSupport),
            _ => {
                return Err(AppError::BadRequest(
                    "a thread targets exactly one client or one driver".to_string(),
                ));
            }
        },
        ActorType::System => {
            return Err(AppError::Forbidden("system actors cannot open threads".to_string()));
        }
    };

    let now = Utc::now();
    let thread = Thread {
        id: Uuid::new_v4(),
        client_id,
        driver_id,
        subject: new.subject.trim().to_string(),
        kind,
        status: ThreadStatus::Open,
        created_at: now,
        updated_at: now,
    };
    insert_thread(state, thread.clone());
    insert_message(
        state,
        Message {
            id: Uuid::new_v4(),
            thread_id: thread.id,
            sender_type: sender_type(actor)?,
            sender_id: actor.id,
            content: new.content,
            is_read: false,
            created_at: now,
        },
    );
    info!(thread_id = %thread.id, kind = ?thread.kind, "thread opened");

    Ok(thread)
}

pub fn send_message(
    state: &AppState,
    thread_id: Uuid,
    content: String,
    actor: &Actor,
) -> Result<Message, AppError> {
    if content.trim().is_empty() {
        return Err(AppError::BadRequest("message is empty".to_string()));
    }
    let thread = get_thread(state, thread_id, actor)?;
    if thread.status == ThreadStatus::Closed {
        return Err(AppError::Conflict("thread is closed".to_string()));
    }

    let message = Message {
        id: Uuid::new_v4(),
        thread_id,
        sender_type: sender_type(actor)?,
        sender_id: actor.id,
        content,
        is_read: false,
        created_at: Utc::now(),
    };
    insert_message(state, message.clone());
    touch_thread(state, thread_id);

    Ok(message)
}

/// Marks as read what `reader` received in the thread. Returns how many
/// messages changed.
pub fn mark_read(state: &AppState, thread_id: Uuid, reader: &Actor) -> Result<usize, AppError> {
    get_thread(state, thread_id, reader)?;

    let mut changed = Vec::new();
    for mut entry in state.messages.iter_mut() {
        let message = entry.value_mut();
        if message.thread_id == thread_id && unread_by(message, reader) {
            message.is_read = true;
            changed.push(message.id);
        }
    }

    for id in &changed {
        state.publish(Table::Messages, ChangeKind::Update, Some(*id));
    }
    Ok(changed.len())
}

pub fn thread_messages(
    state: &AppState,
    thread_id: Uuid,
    actor: &Actor,
) -> Result<Vec<Message>, AppError> {
    get_thread(state, thread_id, actor)?;

    let mut messages: Vec<Message> = state
        .messages
        .iter()
        .filter(|entry| entry.value().thread_id == thread_id)
        .map(|entry| entry.value().clone())
        .collect();

    messages.sort_by_key(|message| message.created_at);
    Ok(messages)
}

/// Threads visible to `actor`, most recently active first.
pub fn list_threads(state: &AppState, actor: &Actor) -> Vec<ThreadSummary> {
    let threads: Vec<Thread> = state
        .threads
        .iter()
        .filter(|entry| can_access(entry.value(), actor))
        .map(|entry| entry.value().clone())
        .collect();

    let mut summaries: Vec<ThreadSummary> = threads
        .into_iter()
        .map(|thread| {
            let unread_count = state
                .messages
                .iter()
                .filter(|entry| {
                    entry.value().thread_id == thread.id && unread_by(entry.value(), actor)
                })
                .count();
            ThreadSummary {
                thread,
                unread_count,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.thread.updated_at.cmp(&a.thread.updated_at));
    summaries
}

pub fn create_complaint(
    state: &AppState,
    new: NewComplaint,
    actor: &Actor,
) -> Result<Complaint, AppError> {
    if actor.actor_type != ActorType::Client {
        return Err(AppError::Forbidden("only clients file complaints".to_string()));
    }
    let client_id = require_id(actor)?;
    if new.subject.trim().is_empty() || new.description.trim().is_empty() {
        return Err(AppError::BadRequest("subject and description are required".to_string()));
    }
    if let Some(order_id) = new.order_id {
        let owned = state
            .orders
            .get(&order_id)
            .map(|order| order.client_id == client_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if !owned {
            return Err(AppError::Forbidden("not your order".to_string()));
        }
    }

    let now = Utc::now();
    let thread = Thread {
        id: Uuid::new_v4(),
        client_id: Some(client_id),
        driver_id: None,
        subject: new.subject.trim().to_string(),
        kind: ThreadKind::Complaint,
        status: ThreadStatus::Open,
        created_at: now,
        updated_at: now,
    };
    insert_thread(state, thread.clone());

    let complaint = Complaint {
        id: Uuid::new_v4(),
        client_id,
        thread_id: thread.id,
        order_id: new.order_id,
        subject: thread.subject.clone(),
        description: new.description.clone(),
        status: ThreadStatus::Open,
        created_at: now,
    };
    state.complaints.insert(complaint.id, complaint.clone());
    state.publish(Table::Complaints, ChangeKind::Insert, Some(complaint.id));

    insert_message(
        state,
        Message {
            id: Uuid::new_v4(),
            thread_id: thread.id,
            sender_type: SenderType::Client,
            sender_id: Some(client_id),
            content: new.description,
            is_read: false,
            created_at: now,
        },
    );
    info!(complaint_id = %complaint.id, client_id = %client_id, "complaint filed");

    Ok(complaint)
}

pub fn list_complaints(state: &AppState, client_id: Option<Uuid>) -> Vec<Complaint> {
    let mut complaints: Vec<Complaint> = state
        .complaints
        .iter()
        .filter(|entry| client_id.is_none_or(|id| entry.value().client_id == id))
        .map(|entry| entry.value().clone())
        .collect();

    complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    complaints
}

/// Sets the thread status and mirrors it on the complaint opened with it.
pub fn update_thread_status(
    state: &AppState,
    thread_id: Uuid,
    status: ThreadStatus,
) -> Result<Thread, AppError> {
    let mut thread = state
        .threads
        .get_mut(&thread_id)
        .ok_or_else(|| AppError::NotFound(format!("thread {thread_id} not found")))?;
    thread.status = status;
    thread.updated_at = Utc::now();
    let updated = thread.clone();
    drop(thread);
    state.publish(Table::Threads, ChangeKind::Update, Some(thread_id));

    if updated.kind == ThreadKind::Complaint {
        let mut mirrored = Vec::new();
        for mut entry in state.complaints.iter_mut() {
            if entry.value().thread_id == thread_id {
                entry.value_mut().status = status;
                mirrored.push(*entry.key());
            }
        }
        for id in mirrored {
            state.publish(Table::Complaints, ChangeKind::Update, Some(id));
        }
    }

    Ok(updated)
}
