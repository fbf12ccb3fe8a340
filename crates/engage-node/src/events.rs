//! Live sync channel: an event bus notifying connected clients (SSE) when
//! task state changes elsewhere, so open task lists stay consistent
//! without a full reload.
//!
//! Events carry identity only. A client receiving `task.created` or
//! `task.updated` re-fetches the task list from the authoritative source;
//! the payload is a cache-invalidation signal, never state. Because every
//! event triggers a full re-fetch, no ordering guarantee is needed and a
//! lagging receiver dropping events is harmless.

use chrono::{DateTime, Utc};
use engage_types::{TaskId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per channel before old ones are dropped.
const HIGH_PRIORITY_BUFFER: usize = 1000;
const LOW_PRIORITY_BUFFER: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveEvent {
    /// Handshake for a freshly established stream.
    Connected {
        user_id: UserId,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A task definition became available. `user_id = None` broadcasts to
    /// every connected user.
    TaskCreated {
        user_id: Option<UserId>,
        task_id: TaskId,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A user's standing on a task changed (started, submitted, decided).
    TaskUpdated {
        user_id: UserId,
        task_id: TaskId,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Keep-alive only; no payload semantics.
    Heartbeat {
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPriority {
    High,
    Low,
}

impl LiveEvent {
    /// Event name on the wire (SSE event field).
    pub fn event_type(&self) -> &'static str {
        match self {
            LiveEvent::Connected { .. } => "connected",
            LiveEvent::TaskCreated { .. } => "task.created",
            LiveEvent::TaskUpdated { .. } => "task.updated",
            LiveEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            LiveEvent::TaskCreated { .. } => EventPriority::High,
            LiveEvent::TaskUpdated { .. } => EventPriority::High,
            LiveEvent::Connected { .. } => EventPriority::Low,
            LiveEvent::Heartbeat { .. } => EventPriority::Low,
        }
    }

    /// The user this event addresses; `None` means every user.
    pub fn user(&self) -> Option<&UserId> {
        match self {
            LiveEvent::Connected { user_id, .. } => Some(user_id),
            LiveEvent::TaskCreated { user_id, .. } => user_id.as_ref(),
            LiveEvent::TaskUpdated { user_id, .. } => Some(user_id),
            LiveEvent::Heartbeat { .. } => None,
        }
    }
}

/// Broadcast bus feeding every live stream. Task events ride the high
/// priority channel so a burst of heartbeats can never crowd them out.
#[derive(Clone)]
pub struct EventBus {
    high_priority: broadcast::Sender<LiveEvent>,
    low_priority: broadcast::Sender<LiveEvent>,
    emitted: Arc<std::sync::atomic::AtomicU64>,
    pub events_emitted_total: Option<Arc<prometheus::IntCounter>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (high_tx, _) = broadcast::channel(HIGH_PRIORITY_BUFFER);
        let (low_tx, _) = broadcast::channel(LOW_PRIORITY_BUFFER);
        Self {
            high_priority: high_tx,
            low_priority: low_tx,
            emitted: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            events_emitted_total: None,
        }
    }

    pub fn set_metrics(&mut self, events_emitted_total: Arc<prometheus::IntCounter>) {
        self.events_emitted_total = Some(events_emitted_total);
    }

    /// Subscribe to both channels: (high, low).
    pub fn subscribe_all(&self) -> (broadcast::Receiver<LiveEvent>, broadcast::Receiver<LiveEvent>) {
        (self.high_priority.subscribe(), self.low_priority.subscribe())
    }

    /// Emit to all subscribers. No subscribers is normal, not an error.
    pub fn emit(&self, event: LiveEvent) {
        let channel = match event.priority() {
            EventPriority::High => &self.high_priority,
            EventPriority::Low => &self.low_priority,
        };

        match channel.send(event.clone()) {
            Ok(subscriber_count) => {
                debug!(
                    event_type = event.event_type(),
                    subscribers = subscriber_count,
                    "Event emitted"
                );
                self.emitted
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if let Some(ref counter) = self.events_emitted_total {
                    counter.inc();
                }
            }
            Err(_) => {
                debug!(
                    event_type = event.event_type(),
                    "Event emitted but no subscribers listening"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.high_priority.receiver_count() + self.low_priority.receiver_count()
    }

    pub fn total_events_emitted(&self) -> u64 {
        self.emitted.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
