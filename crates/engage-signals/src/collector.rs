use crate::event::{ContentEvent, InteractionKind};
use crate::strategy::AcquisitionStrategy;
use engage_types::{AttemptId, EngineParams, SignalSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Load lifecycle of the embedded content. `Failed` is permanent: elapsed
/// time never accrues and completion stays blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    Failed,
}

struct CollectorState {
    snapshot: SignalSnapshot,
    load: LoadState,
    /// Ticks spent in `Pending`; crossing the load timeout flips to `Failed`.
    pending_ticks: u64,
}

/// Per-attempt accumulator of raw engagement signals.
///
/// Cheap to clone; all clones share the same snapshot. The 1-second tick
/// that drives `elapsed_seconds` is an owned [`Ticker`] resource, not an
/// ambient timer.
#[derive(Clone)]
pub struct SignalCollector {
    attempt_id: AttemptId,
    state: Arc<RwLock<CollectorState>>,
    load_timeout_ticks: u64,
    click_weight: u32,
}

impl SignalCollector {
    pub fn new(attempt_id: AttemptId, strategy: AcquisitionStrategy, params: &EngineParams) -> Self {
        let snapshot = SignalSnapshot {
            cross_origin: strategy.is_cross_origin(),
            ..SignalSnapshot::default()
        };
        Self {
            attempt_id,
            state: Arc::new(RwLock::new(CollectorState {
                snapshot,
                load: LoadState::Pending,
                pending_ticks: 0,
            })),
            load_timeout_ticks: params.load_timeout_seconds,
            click_weight: params.click_weight,
        }
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub async fn snapshot(&self) -> SignalSnapshot {
        self.state.read().await.snapshot
    }

    pub async fn load_state(&self) -> LoadState {
        self.state.read().await.load
    }

    /// Apply one raw observation. Scroll is monotonic, counters only grow,
    /// so events may arrive in any order or duplicated without corrupting
    /// the snapshot.
    pub async fn on_content_event(&self, event: ContentEvent) {
        let mut state = self.state.write().await;
        match event {
            ContentEvent::Scroll { percentage } => {
                state.snapshot.record_scroll(percentage);
            }
            ContentEvent::Interaction { kind } => {
                let weight = match kind {
                    InteractionKind::Pointer => 1,
                    InteractionKind::Click => self.click_weight,
                };
                state.snapshot.interaction_count =
                    state.snapshot.interaction_count.saturating_add(weight);
            }
            ContentEvent::AdClick => {
                state.snapshot.ad_click_count = state.snapshot.ad_click_count.saturating_add(1);
                state.snapshot.interaction_count = state
                    .snapshot
                    .interaction_count
                    .saturating_add(self.click_weight);
            }
            ContentEvent::Loaded => {
                // A late load signal after the timeout already fired does
                // not resurrect the attempt.
                if state.load == LoadState::Pending {
                    state.load = LoadState::Loaded;
                    state.snapshot.loaded = true;
                }
            }
            ContentEvent::LoadFailed => {
                state.load = LoadState::Failed;
                state.snapshot.loaded = false;
            }
        }
    }

    /// One second of wall clock. Elapsed time accrues only while the
    /// content is loaded; pending content runs down the load timeout.
    pub async fn tick(&self) {
        let mut state = self.state.write().await;
        match state.load {
            LoadState::Loaded => {
                state.snapshot.elapsed_seconds = state.snapshot.elapsed_seconds.saturating_add(1);
            }
            LoadState::Pending => {
                state.pending_ticks += 1;
                if state.pending_ticks >= self.load_timeout_ticks {
                    state.load = LoadState::Failed;
                    debug!(
                        attempt_id = %self.attempt_id,
                        timeout_seconds = self.load_timeout_ticks,
                        "Content load timed out"
                    );
                }
            }
            LoadState::Failed => {}
        }
    }

    /// Spawn the 1-second ticker. The returned handle owns the timer task;
    /// dropping it (or calling `stop`) cancels the tick and elapsed time
    /// stops accruing.
    pub fn start_ticker(&self) -> Ticker {
        let collector = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick of a tokio interval fires immediately; skip it
            // so second one lands a full second after start.
            interval.tick().await;
            loop {
                interval.tick().await;
                collector.tick().await;
            }
        });
        Ticker { handle }
    }

    /// Bind a channel of content events to this collector. The forwarding
    /// task lives exactly as long as the returned subscription.
    pub fn attach(&self, mut rx: mpsc::Receiver<ContentEvent>) -> EventSubscription {
        let collector = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                collector.on_content_event(event).await;
            }
        });
        EventSubscription { handle }
    }
}

/// Owned 1-second timer resource for one attempt.
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn stop(self) {}
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Subscribe/unsubscribe pair around a content-event source. Dropping the
/// subscription aborts the forwarding task and releases the channel.
pub struct EventSubscription {
    handle: JoinHandle<()>,
}

impl EventSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
