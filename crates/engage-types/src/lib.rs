pub mod attempt;
pub mod eligibility;
pub mod error;
pub mod id;
pub mod reward;
pub mod signal;
pub mod task;

pub use attempt::{AttemptState, Decision, EngagementAttempt, RejectReason};
pub use eligibility::EligibilitySnapshot;
pub use error::{EngageError, Result};
pub use id::{AttemptId, TaskId, UserId};
pub use reward::RewardAmount;
pub use signal::SignalSnapshot;
pub use task::{TaskCategory, TaskDefinition, TaskDifficulty};

/// Tunable engine parameters shared by the gate, collector and arbiter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineParams {
    /// Days after registration during which no referral is required.
    pub trial_window_days: i64,
    /// Accepted completions allowed per rolling 24h window.
    pub daily_quota: u32,
    /// Interactions required when a task declares `require_interaction`.
    pub min_interactions: u32,
    /// Seconds the embedded content may stay pending before it is
    /// considered failed (failure permanently blocks completion).
    pub load_timeout_seconds: u64,
    /// Interaction weight added for a click (plain interactions count 1).
    pub click_weight: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            trial_window_days: 7,
            daily_quota: 10,
            min_interactions: 3,
            load_timeout_seconds: 20,
            click_weight: 2,
        }
    }
}
