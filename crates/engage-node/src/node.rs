use crate::config::NodeConfig;
use crate::events::{EventBus, LiveEvent};
use crate::metrics::Metrics;
use chrono::Utc;
use engage_engine::{MemoryStore, SubmissionArbiter, SubmissionOutcome, TaskLifecycle, TaskStore, TaskView};
use engage_gate::{EligibilityGate, EligibilityInputs, RegionPolicy};
use engage_rewards::{LedgerStorage, MemoryLedger, RewardLedger};
use engage_types::{
    AttemptId, EngageError, EngagementAttempt, EngineParams, Result, RewardAmount, SignalSnapshot,
    TaskDefinition, TaskId, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_name: String,
    pub events_emitted: u64,
    pub live_subscribers: usize,
    pub daily_quota: u32,
}

/// Wires the engine together and is the surface every transport (HTTP,
/// tests) talks to. State changes emit live events here, next to the call
/// that made them.
#[derive(Clone)]
pub struct EngageNode {
    name: String,
    store: Arc<dyn TaskStore>,
    lifecycle: Arc<TaskLifecycle>,
    arbiter: Arc<SubmissionArbiter>,
    ledger: Arc<RewardLedger>,
    event_bus: Arc<EventBus>,
    metrics: Metrics,
}

impl EngageNode {
    /// Build a node with in-memory backends from configuration.
    pub fn new(config: &NodeConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLedger::new()),
        )
    }

    /// Build a node over externally provided backends (the production
    /// deployment passes its relational adapters here).
    pub fn with_backends(
        config: &NodeConfig,
        store: Arc<dyn TaskStore>,
        ledger_storage: Arc<dyn LedgerStorage>,
    ) -> Self {
        let params = config.engine.clone();
        let policy = RegionPolicy::new(config.regions.iter().cloned());
        let gate = EligibilityGate::new(policy, params.clone());

        let metrics = Metrics::new();
        let mut event_bus = EventBus::new();
        event_bus.set_metrics(Arc::new(metrics.events_emitted_total.clone()));

        let lifecycle = Arc::new(TaskLifecycle::new(store.clone(), gate, params.clone()));
        let ledger = Arc::new(RewardLedger::new(ledger_storage));
        let arbiter = Arc::new(SubmissionArbiter::new(
            lifecycle.clone(),
            ledger.clone(),
            params,
        ));

        Self {
            name: config.node.name.clone(),
            store,
            lifecycle,
            arbiter,
            ledger,
            event_bus: Arc::new(event_bus),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn params(&self) -> &EngineParams {
        self.lifecycle.params()
    }

    pub async fn stats(&self) -> Result<NodeStats> {
        Ok(NodeStats {
            node_name: self.name.clone(),
            events_emitted: self.event_bus.total_events_emitted(),
            live_subscribers: self.event_bus.subscriber_count(),
            daily_quota: self.lifecycle.params().daily_quota,
        })
    }

    /// Admin feed: publish a task definition and tell every client.
    pub async fn create_task(&self, task: TaskDefinition) -> Result<()> {
        let task_id = task.id.clone();
        self.store.put_task_definition(task).await?;
        self.metrics.tasks_created.inc();
        self.event_bus.emit(LiveEvent::TaskCreated {
            user_id: None,
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        });
        info!(task_id = %task_id, "📋 Task definition published");
        Ok(())
    }

    /// Account collaborator feed: region, status and referral facts.
    pub async fn register_user(&self, user: &UserId, inputs: EligibilityInputs) -> Result<()> {
        self.store.put_eligibility_inputs(user, inputs).await
    }

    pub async fn list_tasks(&self, user: &UserId) -> Result<Vec<TaskView>> {
        self.lifecycle.list_tasks(user, Utc::now()).await
    }

    pub async fn start_task(&self, user: &UserId, task_id: &TaskId) -> Result<EngagementAttempt> {
        let attempt = self.lifecycle.start_task(user, task_id, Utc::now()).await?;
        self.metrics.attempts_started.inc();
        self.event_bus.emit(LiveEvent::TaskUpdated {
            user_id: user.clone(),
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(attempt)
    }

    pub async fn report_signal(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
        snapshot: SignalSnapshot,
    ) -> Result<EngagementAttempt> {
        let attempt = self.lifecycle.report_signal(attempt_id, user, snapshot).await?;
        self.metrics.signal_reports.inc();
        Ok(attempt)
    }

    pub async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
        snapshot: SignalSnapshot,
        proof: Option<String>,
    ) -> Result<SubmissionOutcome> {
        let result = self
            .arbiter
            .submit(attempt_id, user, snapshot, proof, Utc::now())
            .await;

        match &result {
            Ok(outcome) => {
                self.metrics.attempts_accepted.inc();
                if let Some(reward) = outcome.reward_granted {
                    self.metrics.rewards_credited.inc();
                    self.metrics
                        .reward_minor_units
                        .inc_by(reward.to_minor_units());
                }
                self.emit_task_update(attempt_id, user).await;
            }
            Err(EngageError::AttemptExpired) => {
                // The attempt moved to rejected; clients should refetch.
                self.metrics.attempts_rejected.inc();
                self.emit_task_update(attempt_id, user).await;
            }
            Err(EngageError::InsufficientSignal(_)) | Err(EngageError::QuotaExceeded) => {
                self.metrics.attempts_rejected.inc();
            }
            Err(_) => {}
        }

        result
    }

    async fn emit_task_update(&self, attempt_id: AttemptId, user: &UserId) {
        if let Ok(Some(attempt)) = self.store.get_attempt(attempt_id).await {
            self.event_bus.emit(LiveEvent::TaskUpdated {
                user_id: user.clone(),
                task_id: attempt.task_id,
                timestamp: Utc::now(),
            });
        }
    }

    pub async fn balance_of(&self, user: &UserId) -> Result<RewardAmount> {
        self.ledger
            .balance_of(user)
            .await
            .map_err(|e| EngageError::Storage(e.to_string()))
    }

    /// Subscribe to the live sync channel: (high, low) priority receivers.
    /// The SSE layer filters per user on top of this.
    pub fn subscribe_events(
        &self,
    ) -> (
        tokio::sync::broadcast::Receiver<LiveEvent>,
        tokio::sync::broadcast::Receiver<LiveEvent>,
    ) {
        self.event_bus.subscribe_all()
    }

    /// Periodic keep-alive on the low priority channel. The returned
    /// handle owns the task; abort it on shutdown.
    pub fn spawn_heartbeat(&self, every: Duration) -> JoinHandle<()> {
        let bus = self.event_bus.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                bus.emit(LiveEvent::Heartbeat {
                    timestamp: Utc::now(),
                });
            }
        })
    }
}
