use crate::lifecycle::TaskLifecycle;
use crate::store::AttemptPatch;
use chrono::{DateTime, Duration, Utc};
use engage_gate::quota_window_start;
use engage_rewards::RewardLedger;
use engage_signals::evaluator;
use engage_types::{
    AttemptId, AttemptState, Decision, EngageError, EngineParams, RejectReason, Result,
    RewardAmount, SignalSnapshot, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of an accepted (or review-parked) submission. Every rejection
/// path surfaces as an [`EngageError`] instead, carrying its reason code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub accepted: bool,
    pub pending_review: bool,
    pub reward_granted: Option<RewardAmount>,
    pub engagement_score: f64,
}

/// The only authoritative completion decision-maker, and the only writer
/// of reward state. Client-side `may_complete` is never trusted: the
/// submitted snapshot is re-evaluated here with the same evaluator.
pub struct SubmissionArbiter {
    lifecycle: Arc<TaskLifecycle>,
    ledger: Arc<RewardLedger>,
    params: EngineParams,
}

impl SubmissionArbiter {
    pub fn new(lifecycle: Arc<TaskLifecycle>, ledger: Arc<RewardLedger>, params: EngineParams) -> Self {
        Self {
            lifecycle,
            ledger,
            params,
        }
    }

    pub async fn submit_now(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
        submitted: SignalSnapshot,
        proof: Option<String>,
    ) -> Result<SubmissionOutcome> {
        self.submit(attempt_id, user, submitted, proof, Utc::now())
            .await
    }

    pub async fn submit(
        &self,
        attempt_id: AttemptId,
        user: &UserId,
        submitted: SignalSnapshot,
        proof: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome> {
        let attempt = self.lifecycle.owned_attempt(attempt_id, user).await?;

        let task = self
            .lifecycle
            .store()
            .get_task_definition(&attempt.task_id)
            .await?
            .ok_or_else(|| EngageError::TaskNotFound(attempt.task_id.to_string()))?;

        // Duplicate submission of a decided attempt is a no-op, not a
        // double payment.
        match attempt.state {
            AttemptState::Accepted => {
                return Ok(SubmissionOutcome {
                    accepted: true,
                    pending_review: false,
                    reward_granted: attempt.reward_granted,
                    engagement_score: evaluator::engagement_score(
                        &task,
                        attempt.submission.as_ref().unwrap_or(&attempt.signals),
                        &self.params,
                    ),
                });
            }
            AttemptState::Submitted if attempt.pending_review => {
                return Ok(SubmissionOutcome {
                    accepted: true,
                    pending_review: true,
                    reward_granted: None,
                    engagement_score: evaluator::engagement_score(
                        &task,
                        attempt.submission.as_ref().unwrap_or(&attempt.signals),
                        &self.params,
                    ),
                });
            }
            AttemptState::InProgress => {}
            state => {
                return Err(EngageError::InvalidTransition {
                    from: state,
                    to: AttemptState::Submitted,
                });
            }
        }

        // Stale attempts cannot be cashed in; the limit is enforced here
        // against the server-held start timestamp, not by an active timer.
        let age = now - attempt.started_at;
        if age > Duration::minutes(task.time_limit_minutes as i64) {
            let rejected = Decision {
                accepted: false,
                reason: Some(RejectReason::Expired),
                decided_at: now,
            };
            self.lifecycle
                .store()
                .update_attempt(
                    attempt_id,
                    AttemptPatch {
                        state: Some(AttemptState::Rejected),
                        decision: Some(rejected),
                        last_reject_reason: Some(RejectReason::Expired),
                        ..AttemptPatch::default()
                    },
                )
                .await?;
            warn!(
                attempt_id = %attempt_id,
                user = %user,
                age_minutes = age.num_minutes(),
                limit_minutes = task.time_limit_minutes,
                "⏰ Attempt expired at submission"
            );
            return Err(EngageError::AttemptExpired);
        }

        // Quota may have filled between start and submit.
        let completions = self
            .lifecycle
            .store()
            .accepted_since(user, quota_window_start(now))
            .await?;
        if completions >= self.params.daily_quota {
            self.record_in_place_rejection(attempt_id, RejectReason::QuotaExceeded)
                .await?;
            return Err(EngageError::QuotaExceeded);
        }

        // Clamp the claimed watch time to what the server actually
        // observed; the rest of the snapshot has no server-side ground
        // truth and is taken as reported.
        let server_elapsed = age.num_seconds().max(0) as u64;
        let mut effective = submitted;
        effective.elapsed_seconds = effective.elapsed_seconds.min(server_elapsed);

        if let Some(reason) = evaluator::shortfall(&task, &effective, &self.params) {
            // Recoverable in place: signals are kept and the attempt stays
            // in progress for continued engagement and resubmission.
            let mut signals = attempt.signals;
            signals.merge_from(&effective);
            self.lifecycle
                .store()
                .update_attempt(
                    attempt_id,
                    AttemptPatch {
                        signals: Some(signals),
                        last_reject_reason: Some(reason),
                        ..AttemptPatch::default()
                    },
                )
                .await?;
            info!(
                attempt_id = %attempt_id,
                user = %user,
                reason = reason.code(),
                "Submission rejected on signals"
            );
            return Err(EngageError::InsufficientSignal(reason));
        }

        let score = evaluator::engagement_score(&task, &effective, &self.params);
        self.lifecycle
            .store()
            .update_attempt(
                attempt_id,
                AttemptPatch {
                    state: Some(AttemptState::Submitted),
                    submitted_at: Some(now),
                    submission: Some(effective),
                    signals: Some(effective),
                    proof,
                    ..AttemptPatch::default()
                },
            )
            .await?;

        if task.requires_review {
            self.lifecycle
                .store()
                .update_attempt(
                    attempt_id,
                    AttemptPatch {
                        pending_review: Some(true),
                        ..AttemptPatch::default()
                    },
                )
                .await?;
            info!(
                attempt_id = %attempt_id,
                user = %user,
                task_id = %task.id,
                "⏸️ Submission parked for manual review"
            );
            return Ok(SubmissionOutcome {
                accepted: true,
                pending_review: true,
                reward_granted: None,
                engagement_score: score,
            });
        }

        // Accept and pay. The ledger enforces at-most-once per attempt id,
        // so a race between duplicate submissions cannot double-credit.
        let accepted = Decision {
            accepted: true,
            reason: None,
            decided_at: now,
        };
        self.lifecycle
            .store()
            .update_attempt(
                attempt_id,
                AttemptPatch {
                    state: Some(AttemptState::Accepted),
                    decision: Some(accepted),
                    reward_granted: Some(task.reward),
                    ..AttemptPatch::default()
                },
            )
            .await?;
        self.ledger
            .credit_reward(user, task.reward, attempt_id)
            .await
            .map_err(|e| EngageError::Storage(e.to_string()))?;

        info!(
            attempt_id = %attempt_id,
            user = %user,
            task_id = %task.id,
            reward = %task.reward,
            score = score,
            "✅ Submission accepted"
        );

        Ok(SubmissionOutcome {
            accepted: true,
            pending_review: false,
            reward_granted: Some(task.reward),
            engagement_score: score,
        })
    }

    async fn record_in_place_rejection(
        &self,
        attempt_id: AttemptId,
        reason: RejectReason,
    ) -> Result<()> {
        self.lifecycle
            .store()
            .update_attempt(
                attempt_id,
                AttemptPatch {
                    last_reject_reason: Some(reason),
                    ..AttemptPatch::default()
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TaskStore};
    use engage_gate::{BlockedRegion, EligibilityGate, EligibilityInputs, RegionPolicy};
    use engage_rewards::MemoryLedger;
    use engage_types::{TaskCategory, TaskDefinition, TaskDifficulty, TaskId};

    struct Fixture {
        lifecycle: Arc<TaskLifecycle>,
        arbiter: SubmissionArbiter,
        ledger: Arc<RewardLedger>,
        user: UserId,
    }

    fn task(id: &str) -> TaskDefinition {
        TaskDefinition {
            id: TaskId::new(id),
            title: format!("Task {}", id),
            reward: RewardAmount::from_minor_units(150),
            difficulty: TaskDifficulty::Easy,
            category: TaskCategory::Article,
            content_url: Some("https://news.example.net/a/1".to_string()),
            min_duration_seconds: 45,
            require_scrolling: true,
            min_scroll_percentage: 70,
            require_interaction: false,
            min_ad_clicks: 0,
            max_attempts: 3,
            time_limit_minutes: 30,
            requires_review: false,
        }
    }

    async fn fixture(tasks: Vec<TaskDefinition>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::from("u1");
        for t in tasks {
            store.put_task_definition(t).await.unwrap();
        }
        store
            .put_eligibility_inputs(
                &user,
                EligibilityInputs {
                    region_code: Some("US".to_string()),
                    account_disabled: false,
                    registered_at: Utc::now() - Duration::days(1),
                    qualifying_referrals: 0,
                },
            )
            .await
            .unwrap();

        let params = EngineParams::default();
        let policy = RegionPolicy::new([BlockedRegion {
            code: "XX".to_string(),
            name: "Testland".to_string(),
        }]);
        let gate = EligibilityGate::new(policy, params.clone());
        let lifecycle = Arc::new(TaskLifecycle::new(store, gate, params.clone()));
        let ledger = Arc::new(RewardLedger::new(Arc::new(MemoryLedger::new())));
        let arbiter = SubmissionArbiter::new(lifecycle.clone(), ledger.clone(), params);

        Fixture {
            lifecycle,
            arbiter,
            ledger,
            user,
        }
    }

    fn snapshot(elapsed: u64, scroll: u8) -> SignalSnapshot {
        SignalSnapshot {
            elapsed_seconds: elapsed,
            scroll_percentage: scroll,
            loaded: true,
            ..SignalSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_accept_and_credit_once() {
        let f = fixture(vec![task("t1")]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        let submit_at = started + Duration::seconds(46);
        let outcome = f
            .arbiter
            .submit(attempt.id, &f.user, snapshot(46, 75), None, submit_at)
            .await
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(
            outcome.reward_granted,
            Some(RewardAmount::from_minor_units(150))
        );

        // Second submission of the same accepted attempt: same outcome,
        // no second payment.
        let again = f
            .arbiter
            .submit(attempt.id, &f.user, snapshot(46, 75), None, submit_at)
            .await
            .unwrap();
        assert!(again.accepted);
        assert_eq!(
            f.ledger.balance_of(&f.user).await.unwrap(),
            RewardAmount::from_minor_units(150)
        );
    }

    #[tokio::test]
    async fn test_insufficient_signal_keeps_attempt_in_progress() {
        let f = fixture(vec![task("t1")]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        // 30s / 50% scroll: not enough time yet.
        let err = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                snapshot(30, 50),
                None,
                started + Duration::seconds(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngageError::InsufficientSignal(RejectReason::InsufficientTime)
        ));

        // Signals were retained, state stayed in progress.
        let stored = f.lifecycle.owned_attempt(attempt.id, &f.user).await.unwrap();
        assert_eq!(stored.state, AttemptState::InProgress);
        assert_eq!(stored.signals.scroll_percentage, 50);
        assert_eq!(
            stored.last_reject_reason,
            Some(RejectReason::InsufficientTime)
        );

        // Keep engaging, resubmit, accepted.
        let outcome = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                snapshot(46, 75),
                None,
                started + Duration::seconds(46),
            )
            .await
            .unwrap();
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn test_elapsed_clamped_to_server_clock() {
        let f = fixture(vec![task("t1")]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        // Client claims 60s of engagement 10s after the server-side start.
        let err = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                snapshot(60, 80),
                None,
                started + Duration::seconds(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngageError::InsufficientSignal(RejectReason::InsufficientTime)
        ));
    }

    #[tokio::test]
    async fn test_expired_attempt_is_rejected_and_retryable() {
        let f = fixture(vec![task("t1")]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        // Perfect signals, but past the 30 minute limit.
        let err = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                snapshot(46, 75),
                None,
                started + Duration::minutes(31),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngageError::AttemptExpired));

        let stored = f.lifecycle.owned_attempt(attempt.id, &f.user).await.unwrap();
        assert_eq!(stored.state, AttemptState::Rejected);
        assert_eq!(stored.decision.unwrap().reason, Some(RejectReason::Expired));
        assert!(f
            .ledger
            .credit_for_attempt(attempt.id)
            .await
            .unwrap()
            .is_none());

        // maxAttempts allows a fresh attempt.
        let retry = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started + Duration::minutes(32))
            .await
            .unwrap();
        assert_ne!(retry.id, attempt.id);
        assert_eq!(retry.index, 1);
    }

    #[tokio::test]
    async fn test_unloaded_content_never_completes() {
        let f = fixture(vec![task("t1")]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        // Cross-origin content that never fired loaded: elapsed far past
        // the minimum still cannot pass.
        let never_loaded = SignalSnapshot {
            elapsed_seconds: 300,
            scroll_percentage: 100,
            loaded: false,
            cross_origin: true,
            ..SignalSnapshot::default()
        };
        let err = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                never_loaded,
                None,
                started + Duration::seconds(400),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngageError::InsufficientSignal(RejectReason::InsufficientTime)
        ));
    }

    #[tokio::test]
    async fn test_review_task_parks_without_reward() {
        let mut reviewed = task("t1");
        reviewed.requires_review = true;
        let f = fixture(vec![reviewed]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        let outcome = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                snapshot(46, 75),
                Some("watched it all".to_string()),
                started + Duration::seconds(46),
            )
            .await
            .unwrap();
        assert!(outcome.accepted);
        assert!(outcome.pending_review);
        assert_eq!(outcome.reward_granted, None);

        let stored = f.lifecycle.owned_attempt(attempt.id, &f.user).await.unwrap();
        assert_eq!(stored.state, AttemptState::Submitted);
        assert!(stored.pending_review);
        assert_eq!(
            f.ledger.balance_of(&f.user).await.unwrap(),
            RewardAmount::ZERO
        );
    }

    #[tokio::test]
    async fn test_proofless_task_without_content() {
        let mut free_form = task("t1");
        free_form.content_url = None;
        free_form.require_scrolling = false;
        free_form.min_duration_seconds = 0;
        let f = fixture(vec![free_form]).await;
        let started = Utc::now();
        let attempt = f
            .lifecycle
            .start_task(&f.user, &TaskId::from("t1"), started)
            .await
            .unwrap();

        // Explicit completion with proof text is the whole gate.
        let outcome = f
            .arbiter
            .submit(
                attempt.id,
                &f.user,
                SignalSnapshot::default(),
                Some("done, receipt attached".to_string()),
                started + Duration::seconds(5),
            )
            .await
            .unwrap();
        assert!(outcome.accepted);

        let stored = f.lifecycle.owned_attempt(attempt.id, &f.user).await.unwrap();
        assert_eq!(stored.proof.as_deref(), Some("done, receipt attached"));
    }
}
