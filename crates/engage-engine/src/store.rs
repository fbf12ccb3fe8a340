use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engage_gate::EligibilityInputs;
use engage_types::{
    AttemptId, AttemptState, Decision, EngageError, EngagementAttempt, RejectReason, Result,
    RewardAmount, SignalSnapshot, TaskDefinition, TaskId, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Field-wise update applied to an attempt row. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct AttemptPatch {
    pub state: Option<AttemptState>,
    pub signals: Option<SignalSnapshot>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submission: Option<SignalSnapshot>,
    pub proof: Option<String>,
    pub decision: Option<Decision>,
    pub last_reject_reason: Option<RejectReason>,
    pub pending_review: Option<bool>,
    pub reward_granted: Option<RewardAmount>,
}

impl AttemptPatch {
    fn apply(self, attempt: &mut EngagementAttempt) {
        if let Some(state) = self.state {
            attempt.state = state;
        }
        if let Some(signals) = self.signals {
            attempt.signals = signals;
        }
        if let Some(submitted_at) = self.submitted_at {
            attempt.submitted_at = Some(submitted_at);
        }
        if let Some(submission) = self.submission {
            attempt.submission = Some(submission);
        }
        if let Some(proof) = self.proof {
            attempt.proof = Some(proof);
        }
        if let Some(decision) = self.decision {
            attempt.decision = Some(decision);
        }
        if let Some(reason) = self.last_reject_reason {
            attempt.last_reject_reason = Some(reason);
        }
        if let Some(pending_review) = self.pending_review {
            attempt.pending_review = pending_review;
        }
        if let Some(reward) = self.reward_granted {
            attempt.reward_granted = Some(reward);
        }
    }
}

/// Persistence consumed by the lifecycle and arbiter. The platform's
/// relational store implements this behind its ORM; [`MemoryStore`] backs
/// tests and single-process deployments.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn put_task_definition(&self, task: TaskDefinition) -> Result<()>;
    async fn get_task_definition(&self, task_id: &TaskId) -> Result<Option<TaskDefinition>>;
    /// Task definitions visible to one user. Per-user targeting is the
    /// relational store's concern; the memory backend serves the whole
    /// catalog to everyone.
    async fn get_task_definitions(&self, user: &UserId) -> Result<Vec<TaskDefinition>>;

    /// Return the live (non-terminal) attempt for (user, task), or create
    /// the next one. Attempt ids derive from the attempt index, so the row
    /// created here is the one every later call resolves.
    async fn get_or_create_attempt(
        &self,
        user: &UserId,
        task: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<EngagementAttempt>;
    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Option<EngagementAttempt>>;
    async fn attempts_for_task(
        &self,
        user: &UserId,
        task: &TaskId,
    ) -> Result<Vec<EngagementAttempt>>;
    async fn update_attempt(
        &self,
        attempt_id: AttemptId,
        patch: AttemptPatch,
    ) -> Result<EngagementAttempt>;

    /// Accepted completions for the user since `since` (the rolling daily
    /// quota window).
    async fn accepted_since(&self, user: &UserId, since: DateTime<Utc>) -> Result<u32>;

    async fn get_eligibility_inputs(&self, user: &UserId) -> Result<Option<EligibilityInputs>>;
    async fn put_eligibility_inputs(&self, user: &UserId, inputs: EligibilityInputs) -> Result<()>;
}

#[derive(Default)]
struct MemoryStoreState {
    tasks: HashMap<TaskId, TaskDefinition>,
    task_order: Vec<TaskId>,
    attempts: HashMap<AttemptId, EngagementAttempt>,
    eligibility: HashMap<UserId, EligibilityInputs>,
}

pub struct MemoryStore {
    state: Arc<RwLock<MemoryStoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryStoreState::default())),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn put_task_definition(&self, task: TaskDefinition) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.tasks.contains_key(&task.id) {
            state.task_order.push(task.id.clone());
        }
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task_definition(&self, task_id: &TaskId) -> Result<Option<TaskDefinition>> {
        let state = self.state.read().await;
        Ok(state.tasks.get(task_id).cloned())
    }

    async fn get_task_definitions(&self, _user: &UserId) -> Result<Vec<TaskDefinition>> {
        let state = self.state.read().await;
        Ok(state
            .task_order
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect())
    }

    async fn get_or_create_attempt(
        &self,
        user: &UserId,
        task: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<EngagementAttempt> {
        let mut state = self.state.write().await;

        let live = state
            .attempts
            .values()
            .filter(|a| &a.user_id == user && &a.task_id == task)
            .find(|a| !a.state.is_terminal())
            .cloned();
        if let Some(live) = live {
            return Ok(live);
        }

        let index = state
            .attempts
            .values()
            .filter(|a| &a.user_id == user && &a.task_id == task)
            .count() as u32;
        let attempt = EngagementAttempt::new(user.clone(), task.clone(), index, now);
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Option<EngagementAttempt>> {
        let state = self.state.read().await;
        Ok(state.attempts.get(&attempt_id).cloned())
    }

    async fn attempts_for_task(
        &self,
        user: &UserId,
        task: &TaskId,
    ) -> Result<Vec<EngagementAttempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<EngagementAttempt> = state
            .attempts
            .values()
            .filter(|a| &a.user_id == user && &a.task_id == task)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.index);
        Ok(attempts)
    }

    async fn update_attempt(
        &self,
        attempt_id: AttemptId,
        patch: AttemptPatch,
    ) -> Result<EngagementAttempt> {
        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| EngageError::AttemptNotFound(attempt_id.to_hex()))?;
        patch.apply(attempt);
        Ok(attempt.clone())
    }

    async fn accepted_since(&self, user: &UserId, since: DateTime<Utc>) -> Result<u32> {
        let state = self.state.read().await;
        let count = state
            .attempts
            .values()
            .filter(|a| {
                &a.user_id == user
                    && a.state == AttemptState::Accepted
                    && a.decision.map(|d| d.decided_at >= since).unwrap_or(false)
            })
            .count();
        Ok(count as u32)
    }

    async fn get_eligibility_inputs(&self, user: &UserId) -> Result<Option<EligibilityInputs>> {
        let state = self.state.read().await;
        Ok(state.eligibility.get(user).cloned())
    }

    async fn put_eligibility_inputs(&self, user: &UserId, inputs: EligibilityInputs) -> Result<()> {
        let mut state = self.state.write().await;
        state.eligibility.insert(user.clone(), inputs);
        Ok(())
    }
}
