//! Server-Sent Events endpoint for the live sync channel.
//!
//! One long-lived stream per authenticated session. Clients treat every
//! `task.created`/`task.updated` purely as a cache-invalidation signal and
//! re-fetch the task list; on stream error they fall back to polling until
//! the stream re-establishes.

use crate::api::AppState;
use crate::events::LiveEvent;
use crate::metrics::Metrics;
use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use engage_types::UserId;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    /// User the stream belongs to; only their events (and broadcasts) are
    /// delivered.
    pub user: String,

    /// Filter by event types (comma-separated), e.g.
    /// "task.created,task.updated". Defaults to all.
    #[serde(default)]
    pub events: Option<String>,
}

#[derive(Clone)]
struct SseConnection {
    user: UserId,
    subscribed_events: HashSet<String>,
}

/// Decrements the SSE connection gauge when the stream is dropped.
struct ConnectionGuard {
    metrics: Metrics,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.sse_connections.dec();
        debug!("SSE connection closed");
    }
}

impl SseConnection {
    fn new(user: UserId, events_filter: Option<String>) -> Self {
        let subscribed_events = match events_filter {
            Some(events) if events != "all" => {
                events.split(',').map(|s| s.trim().to_string()).collect()
            }
            _ => {
                let mut set = HashSet::new();
                set.insert("all".to_string());
                set
            }
        };
        Self {
            user,
            subscribed_events,
        }
    }

    fn should_send_event(&self, event: &LiveEvent) -> bool {
        // Another user's event never reaches this stream.
        if let Some(user) = event.user() {
            if user != &self.user {
                return false;
            }
        }

        if self.subscribed_events.contains("all") {
            return true;
        }
        self.subscribed_events.contains(event.event_type())
    }
}

pub async fn sse_handler(
    Query(query): Query<SseQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!(user = %query.user, events = ?query.events, "SSE connection request");

    let metrics = state.node.metrics().clone();
    metrics.sse_connections.inc();

    let connection = SseConnection::new(UserId::new(query.user), query.events);
    let stream = create_event_stream(state, connection, metrics);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

fn create_event_stream(
    state: Arc<AppState>,
    connection: SseConnection,
    metrics: Metrics,
) -> Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> {
    let _guard = ConnectionGuard {
        metrics: metrics.clone(),
    };

    let (high_rx, low_rx) = state.node.event_bus().subscribe_all();
    let high_stream = tokio_stream::wrappers::BroadcastStream::new(high_rx);
    let low_stream = tokio_stream::wrappers::BroadcastStream::new(low_rx);
    let merged = stream::select(high_stream, low_stream);

    info!(
        user = %connection.user,
        subscribed_events = ?connection.subscribed_events,
        "SSE connection established"
    );

    // Handshake first, then the live feed.
    let connected = LiveEvent::Connected {
        user_id: connection.user.clone(),
        timestamp: Utc::now(),
    };
    let initial_metrics = metrics.clone();
    let initial = stream::once(async move { create_sse_event(connected, initial_metrics) });

    let filtered = merged
        .filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(e) => {
                    // A lagging receiver dropped events; clients refetch on
                    // every event, so nothing is lost.
                    debug!(error = ?e, "Broadcast stream lagged");
                    None
                }
            }
        })
        .filter(move |event| futures_util::future::ready(connection.should_send_event(event)))
        .map(move |event| create_sse_event(event, metrics.clone()))
        .chain(stream::once(async move {
            drop(_guard);
            Ok(Event::default())
        }));

    Box::pin(initial.chain(filtered))
}

fn create_sse_event(event: LiveEvent, metrics: Metrics) -> Result<Event, Infallible> {
    let event_type = event.event_type();
    let data = match serde_json::to_string(&event) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize live event");
            return Ok(Event::default().data("error"));
        }
    };

    metrics.sse_messages_sent.inc();
    Ok(Event::default().event(event_type).data(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_types::TaskId;

    #[test]
    fn test_per_user_filter() {
        let conn = SseConnection::new(UserId::from("u1"), None);

        let own = LiveEvent::TaskUpdated {
            user_id: UserId::from("u1"),
            task_id: TaskId::from("t1"),
            timestamp: Utc::now(),
        };
        assert!(conn.should_send_event(&own));

        let foreign = LiveEvent::TaskUpdated {
            user_id: UserId::from("u2"),
            task_id: TaskId::from("t1"),
            timestamp: Utc::now(),
        };
        assert!(!conn.should_send_event(&foreign));

        // Broadcasts reach every user.
        let broadcast = LiveEvent::TaskCreated {
            user_id: None,
            task_id: TaskId::from("t2"),
            timestamp: Utc::now(),
        };
        assert!(conn.should_send_event(&broadcast));
    }

    #[test]
    fn test_event_type_filter() {
        let conn = SseConnection::new(UserId::from("u1"), Some("task.updated".to_string()));

        let update = LiveEvent::TaskUpdated {
            user_id: UserId::from("u1"),
            task_id: TaskId::from("t1"),
            timestamp: Utc::now(),
        };
        assert!(conn.should_send_event(&update));

        let heartbeat = LiveEvent::Heartbeat {
            timestamp: Utc::now(),
        };
        assert!(!conn.should_send_event(&heartbeat));
    }
}
