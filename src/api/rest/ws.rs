use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::change::Table;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub table: Option<Table>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.table))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, table: Option<Table>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.changes_tx.subscribe();

    info!(table = ?table, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let change = match rx.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged, changes dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if table.is_some_and(|wanted| change.table != wanted) {
                continue;
            }

            let json = match serde_json::to_string(&change) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize change for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
