use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::api::rest::ws::FeedQuery;
use crate::state::AppState;

/// Server-sent change feed. Lagged receivers skip the missed changes.
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.changes_tx.subscribe();
    let table = query.table;

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(change) if table.is_none_or(|wanted| change.table == wanted) => {
            match Event::default().event("change").json_data(&change) {
                Ok(event) => Some(Ok(event)),
                Err(err) => {
                    warn!(error = %err, "failed to serialize change for sse");
                    None
                }
            }
        }
        Ok(_) => None,
        Err(err) => {
            warn!(error = %err, "sse subscriber lagged, changes dropped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
