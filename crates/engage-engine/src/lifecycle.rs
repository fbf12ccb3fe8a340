use crate::store::{AttemptPatch, TaskStore};
use chrono::{DateTime, Utc};
use engage_gate::{quota_window_start, EligibilityGate};
use engage_signals::evaluator;
use engage_types::{
    AttemptId, AttemptState, EligibilitySnapshot, EngageError, EngagementAttempt, EngineParams,
    Result, RewardAmount, SignalSnapshot, TaskDefinition, TaskId, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Derived standing of one task for one user. Attempt rows only carry the
/// in-flight states; the rest falls out of eligibility and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ineligible,
    Assignable,
    InProgress,
    Submitted,
    Completed,
    Exhausted,
}

/// What the task list hands the UI. `progress` is the engagement score of
/// the live attempt scaled to 0-100; advisory, like everything here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub title: String,
    pub reward: RewardAmount,
    pub status: TaskStatus,
    pub can_start: bool,
    pub is_in_progress: bool,
    pub is_completed: bool,
    pub progress: u8,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub attempt_id: Option<AttemptId>,
}

/// Owns attempt rows and their transitions. All state changes flow through
/// here or the arbiter; nothing else writes attempts.
pub struct TaskLifecycle {
    store: Arc<dyn TaskStore>,
    gate: EligibilityGate,
    params: EngineParams,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn TaskStore>, gate: EligibilityGate, params: EngineParams) -> Self {
        Self {
            store,
            gate,
            params,
        }
    }

    /// Recompute the user's eligibility snapshot from stored inputs plus
    /// the accepted-completion count in the rolling quota window.
    pub async fn eligibility(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<EligibilitySnapshot> {
        let inputs = self
            .store
            .get_eligibility_inputs(user)
            .await?
            .ok_or_else(|| {
                EngageError::Storage(format!("no eligibility record for user {}", user))
            })?;
        let completions = self
            .store
            .accepted_since(user, quota_window_start(now))
            .await?;
        Ok(self.gate.evaluate(&inputs, completions, now))
    }

    /// Task list for one user. A region block aborts the whole listing
    /// with the blocking region; nothing else is fabricated here.
    pub async fn list_tasks(&self, user: &UserId, now: DateTime<Utc>) -> Result<Vec<TaskView>> {
        let eligibility = self.eligibility(user, now).await?;
        if eligibility.region_blocked {
            return Err(EngageError::RegionBlocked {
                code: eligibility.region_code.unwrap_or_default(),
                name: eligibility.region_name.unwrap_or_default(),
            });
        }

        let mut views = Vec::new();
        for task in self.store.get_task_definitions(user).await? {
            let attempts = self.store.attempts_for_task(user, &task.id).await?;
            views.push(self.view_for(&task, &attempts, &eligibility));
        }
        Ok(views)
    }

    fn view_for(
        &self,
        task: &TaskDefinition,
        attempts: &[EngagementAttempt],
        eligibility: &EligibilitySnapshot,
    ) -> TaskView {
        let live = attempts.iter().find(|a| !a.state.is_terminal());
        let accepted = attempts.iter().any(|a| a.state == AttemptState::Accepted);

        let status = if accepted {
            TaskStatus::Completed
        } else if let Some(attempt) = live {
            if attempt.state == AttemptState::Submitted {
                TaskStatus::Submitted
            } else {
                TaskStatus::InProgress
            }
        } else if attempts.len() as u32 >= task.max_attempts {
            TaskStatus::Exhausted
        } else if !eligibility.allows_start() {
            TaskStatus::Ineligible
        } else {
            TaskStatus::Assignable
        };

        let progress = match status {
            TaskStatus::Completed => 100,
            _ => live
                .map(|a| (evaluator::engagement_score(task, &a.signals, &self.params) * 100.0) as u8)
                .unwrap_or(0),
        };

        TaskView {
            task_id: task.id.clone(),
            title: task.title.clone(),
            reward: task.reward,
            status,
            can_start: status == TaskStatus::Assignable,
            is_in_progress: status == TaskStatus::InProgress,
            is_completed: status == TaskStatus::Completed,
            progress,
            attempts_used: attempts.len() as u32,
            max_attempts: task.max_attempts,
            attempt_id: live.map(|a| a.id),
        }
    }

    /// Accept a start request: gate, attempt allowance, then create the
    /// row server-side and move it straight to `InProgress` so timing
    /// cannot be spoofed by a client that never calls start.
    pub async fn start_task(
        &self,
        user: &UserId,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<EngagementAttempt> {
        let eligibility = self.eligibility(user, now).await?;
        if let Some(deny) = eligibility.deny_reason() {
            return Err(deny);
        }

        let task = self
            .store
            .get_task_definition(task_id)
            .await?
            .ok_or_else(|| EngageError::TaskNotFound(task_id.to_string()))?;

        let attempts = self.store.attempts_for_task(user, task_id).await?;
        if attempts.iter().any(|a| a.state == AttemptState::Accepted) {
            // Completed tasks cannot be re-run for another payout.
            return Err(EngageError::AttemptsExhausted);
        }
        let has_live = attempts.iter().any(|a| !a.state.is_terminal());
        if !has_live && attempts.len() as u32 >= task.max_attempts {
            return Err(EngageError::AttemptsExhausted);
        }

        let attempt = self.store.get_or_create_attempt(user, task_id, now).await?;
        let attempt = if attempt.state == AttemptState::Started {
            self.transition(&attempt, AttemptState::InProgress).await?
        } else {
            // Start is idempotent on a live attempt.
            debug!(attempt_id = %attempt.id, state = %attempt.state, "Start re-used live attempt");
            attempt
        };

        info!(
            user = %user,
            task_id = %task_id,
            attempt_id = %attempt.id,
            attempt_index = attempt.index,
            "🎬 Attempt started"
        );
        Ok(attempt)
    }

    /// Merge a client's cumulative signal snapshot into the attempt.
    /// Component-wise max keeps this commutative and duplicate-safe.
    pub async fn report_signal(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
        reported: SignalSnapshot,
    ) -> Result<EngagementAttempt> {
        let attempt = self.owned_attempt(attempt_id, user).await?;
        if attempt.state != AttemptState::InProgress {
            return Err(EngageError::InvalidTransition {
                from: attempt.state,
                to: AttemptState::InProgress,
            });
        }

        let mut signals = attempt.signals;
        signals.merge_from(&reported);

        self.store
            .update_attempt(
                attempt_id,
                AttemptPatch {
                    signals: Some(signals),
                    ..AttemptPatch::default()
                },
            )
            .await
    }

    /// Fetch an attempt, hiding rows owned by other users. Absence and
    /// foreign ownership are deliberately indistinguishable.
    pub async fn owned_attempt(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
    ) -> Result<EngagementAttempt> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| EngageError::AttemptNotFound(attempt_id.to_hex()))?;
        if &attempt.user_id != user {
            return Err(EngageError::AttemptNotFound(attempt_id.to_hex()));
        }
        Ok(attempt)
    }

    /// Apply a legality-checked state transition.
    pub async fn transition(
        &self,
        attempt: &EngagementAttempt,
        next: AttemptState,
    ) -> Result<EngagementAttempt> {
        if !attempt.state.can_transition_to(next) {
            return Err(EngageError::InvalidTransition {
                from: attempt.state,
                to: next,
            });
        }
        debug!(
            attempt_id = %attempt.id,
            from = %attempt.state,
            to = %next,
            "Attempt transition"
        );
        self.store
            .update_attempt(
                attempt.id,
                AttemptPatch {
                    state: Some(next),
                    ..AttemptPatch::default()
                },
            )
            .await
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use engage_gate::{BlockedRegion, EligibilityInputs, RegionPolicy};
    use engage_types::{TaskCategory, TaskDifficulty};

    fn task(id: &str, max_attempts: u32) -> TaskDefinition {
        TaskDefinition {
            id: TaskId::new(id),
            title: format!("Task {}", id),
            reward: RewardAmount::from_minor_units(100),
            difficulty: TaskDifficulty::Easy,
            category: TaskCategory::Article,
            content_url: Some("https://news.example.net/a/1".to_string()),
            min_duration_seconds: 45,
            require_scrolling: true,
            min_scroll_percentage: 70,
            require_interaction: false,
            min_ad_clicks: 0,
            max_attempts,
            time_limit_minutes: 30,
            requires_review: false,
        }
    }

    fn inputs(registered_days_ago: i64, referrals: u32, region: &str) -> EligibilityInputs {
        EligibilityInputs {
            region_code: Some(region.to_string()),
            account_disabled: false,
            registered_at: Utc::now() - Duration::days(registered_days_ago),
            qualifying_referrals: referrals,
        }
    }

    async fn lifecycle_with(
        tasks: Vec<TaskDefinition>,
        user_inputs: EligibilityInputs,
    ) -> (TaskLifecycle, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::from("u1");
        for t in tasks {
            store.put_task_definition(t).await.unwrap();
        }
        store.put_eligibility_inputs(&user, user_inputs).await.unwrap();

        let policy = RegionPolicy::new([BlockedRegion {
            code: "XX".to_string(),
            name: "Testland".to_string(),
        }]);
        let gate = EligibilityGate::new(policy, EngineParams::default());
        (
            TaskLifecycle::new(store, gate, EngineParams::default()),
            user,
        )
    }

    #[tokio::test]
    async fn test_region_blocked_list_returns_no_tasks() {
        let (lifecycle, user) =
            lifecycle_with(vec![task("t1", 3), task("t2", 3)], inputs(1, 0, "XX")).await;

        let err = lifecycle.list_tasks(&user, Utc::now()).await.unwrap_err();
        match err {
            EngageError::RegionBlocked { code, name } => {
                assert_eq!(code, "XX");
                assert_eq!(name, "Testland");
            }
            other => panic!("expected RegionBlocked, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_referral_gate_blocks_start_but_lists_tasks() {
        let (lifecycle, user) = lifecycle_with(vec![task("t1", 3)], inputs(10, 0, "US")).await;
        let now = Utc::now();

        let views = lifecycle.list_tasks(&user, now).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, TaskStatus::Ineligible);
        assert!(!views[0].can_start);

        let err = lifecycle
            .start_task(&user, &TaskId::from("t1"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngageError::ReferralRequired));
    }

    #[tokio::test]
    async fn test_start_creates_in_progress_attempt() {
        let (lifecycle, user) = lifecycle_with(vec![task("t1", 3)], inputs(1, 0, "US")).await;
        let now = Utc::now();

        let attempt = lifecycle
            .start_task(&user, &TaskId::from("t1"), now)
            .await
            .unwrap();
        assert_eq!(attempt.state, AttemptState::InProgress);
        assert_eq!(attempt.started_at, now);

        // Starting again re-uses the live attempt.
        let again = lifecycle
            .start_task(&user, &TaskId::from("t1"), now)
            .await
            .unwrap();
        assert_eq!(attempt.id, again.id);

        let views = lifecycle.list_tasks(&user, now).await.unwrap();
        assert!(views[0].is_in_progress);
        assert_eq!(views[0].attempt_id, Some(attempt.id));
    }

    #[tokio::test]
    async fn test_report_signal_merges_monotonically() {
        let (lifecycle, user) = lifecycle_with(vec![task("t1", 3)], inputs(1, 0, "US")).await;
        let now = Utc::now();
        let attempt = lifecycle
            .start_task(&user, &TaskId::from("t1"), now)
            .await
            .unwrap();

        let report = |elapsed, scroll| SignalSnapshot {
            elapsed_seconds: elapsed,
            scroll_percentage: scroll,
            loaded: true,
            ..SignalSnapshot::default()
        };

        lifecycle
            .report_signal(attempt.id, &user, report(10, 40))
            .await
            .unwrap();
        // Out-of-order, partially stale report: nothing regresses.
        let updated = lifecycle
            .report_signal(attempt.id, &user, report(8, 25))
            .await
            .unwrap();
        assert_eq!(updated.signals.elapsed_seconds, 10);
        assert_eq!(updated.signals.scroll_percentage, 40);
        assert!(updated.signals.loaded);
    }

    #[tokio::test]
    async fn test_report_signal_hides_foreign_attempts() {
        let (lifecycle, user) = lifecycle_with(vec![task("t1", 3)], inputs(1, 0, "US")).await;
        let attempt = lifecycle
            .start_task(&user, &TaskId::from("t1"), Utc::now())
            .await
            .unwrap();

        let stranger = UserId::from("u2");
        let err = lifecycle
            .report_signal(attempt.id, &stranger, SignalSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngageError::AttemptNotFound(_)));
    }

    #[tokio::test]
    async fn test_quota_marks_tasks_ineligible_for_the_day() {
        let (lifecycle, user) = lifecycle_with(vec![task("t1", 3)], inputs(1, 0, "US")).await;
        let store = lifecycle.store().clone();
        let now = Utc::now();

        // Fill the quota with accepted attempts on synthetic tasks.
        for i in 0..EngineParams::default().daily_quota {
            let tid = TaskId::new(format!("filler-{i}"));
            store.put_task_definition(task(tid.as_str(), 1)).await.unwrap();
            let attempt = store.get_or_create_attempt(&user, &tid, now).await.unwrap();
            store
                .update_attempt(
                    attempt.id,
                    AttemptPatch {
                        state: Some(AttemptState::Accepted),
                        decision: Some(engage_types::Decision {
                            accepted: true,
                            reason: None,
                            decided_at: now,
                        }),
                        ..AttemptPatch::default()
                    },
                )
                .await
                .unwrap();
        }

        let views = lifecycle.list_tasks(&user, now).await.unwrap();
        let view = views.iter().find(|v| v.task_id == TaskId::from("t1")).unwrap();
        assert_eq!(view.status, TaskStatus::Ineligible);

        let err = lifecycle
            .start_task(&user, &TaskId::from("t1"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngageError::QuotaExceeded));
    }
}
