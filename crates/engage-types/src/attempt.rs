use crate::id::{AttemptId, TaskId, UserId};
use crate::reward::RewardAmount;
use crate::signal::SignalSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attempt lifecycle. States only move forward; `Accepted` and `Rejected`
/// are final. `Ineligible`/`Assignable`/`Exhausted` are derived per
/// (user, task) and never stored on an attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Started,
    InProgress,
    Submitted,
    Accepted,
    Rejected,
}

impl AttemptState {
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Started, InProgress)
                | (InProgress, Submitted)
                | (InProgress, Rejected)
                | (Submitted, Accepted)
                | (Submitted, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Accepted | AttemptState::Rejected)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Started => "started",
            AttemptState::InProgress => "in_progress",
            AttemptState::Submitted => "submitted",
            AttemptState::Accepted => "accepted",
            AttemptState::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Why a submission was turned down. Machine-readable codes route the UI
/// to the right remedial action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientTime,
    InsufficientScroll,
    InsufficientInteraction,
    InsufficientAdClicks,
    QuotaExceeded,
    Expired,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InsufficientTime => "insufficient-time",
            RejectReason::InsufficientScroll => "insufficient-scroll",
            RejectReason::InsufficientInteraction => "insufficient-interaction",
            RejectReason::InsufficientAdClicks => "insufficient-ad-clicks",
            RejectReason::QuotaExceeded => "quota-exceeded",
            RejectReason::Expired => "expired",
        }
    }

    /// Signal shortfalls are recoverable in place: the attempt keeps its
    /// accumulated signals and may be resubmitted. Expiry is not.
    pub fn is_retryable_in_place(&self) -> bool {
        !matches!(self, RejectReason::Expired)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub decided_at: DateTime<Utc>,
}

/// One user's single try at one task. Audit record, never destroyed;
/// a retry creates a new attempt with the next index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementAttempt {
    pub id: AttemptId,
    pub task_id: TaskId,
    pub user_id: UserId,
    /// 0-based attempt index for this (user, task) pair.
    pub index: u32,
    pub state: AttemptState,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Live accumulated signals, merged monotonically as reports arrive.
    pub signals: SignalSnapshot,
    /// Snapshot frozen at submit time; what the arbiter judged.
    pub submission: Option<SignalSnapshot>,
    /// Free-text proof for tasks without embeddable content.
    pub proof: Option<String>,
    pub decision: Option<Decision>,
    /// Most recent rejection reason, including in-place ones that left the
    /// attempt in progress. Audit trail only.
    pub last_reject_reason: Option<RejectReason>,
    /// Accepted on signals but awaiting manual moderation; no reward yet.
    pub pending_review: bool,
    pub reward_granted: Option<RewardAmount>,
}

impl EngagementAttempt {
    pub fn new(user_id: UserId, task_id: TaskId, index: u32, started_at: DateTime<Utc>) -> Self {
        let id = AttemptId::derive(&user_id, &task_id, index);
        Self {
            id,
            task_id,
            user_id,
            index,
            state: AttemptState::Started,
            started_at,
            submitted_at: None,
            signals: SignalSnapshot::default(),
            submission: None,
            proof: None,
            decision: None,
            last_reject_reason: None,
            pending_review: false,
            reward_granted: None,
        }
    }
}
