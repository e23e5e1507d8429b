//! Server-Sent Events change feed
//!
//! One stream per open editor, scoped to a project and filtered server-side
//! to a single step. Messages carry only the event tag and the key; clients
//! that want the new content reload it through the repository.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Step the editor is mounted on
    pub step: i64,
}

/// GET /api/projects/:id/events?step=N
pub async fn event_stream(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<EventQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "New SSE client for project {} step {}",
        project_id, query.step
    );

    let mut rx = state.bus.subscribe();
    let step_number = query.step;

    let stream = async_stream::stream! {
        // Initial connected status so the editor can show link state
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.project_id != project_id || event.step_number != step_number {
                        continue;
                    }
                    debug!("SSE: forwarding {} for step {}", event.kind.as_str(), step_number);
                    let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().event(event.kind.as_str()).data(data));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Dropped notifications are indistinguishable from one;
                    // tell the client to reload once
                    debug!("SSE: lagged {} events, asking client to resync", skipped);
                    yield Ok(Event::default().event("Resync").data("reload"));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
