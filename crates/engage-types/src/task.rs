use crate::id::TaskId;
use crate::reward::RewardAmount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDifficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Article,
    Video,
    Survey,
    Social,
    Other,
}

/// Immutable task template, created by the admin side and read-only here.
///
/// The requirement fields drive the completion evaluator: duration is always
/// enforced for content tasks, the remaining gates only when declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub title: String,
    pub reward: RewardAmount,
    pub difficulty: TaskDifficulty,
    pub category: TaskCategory,
    /// Article/video to embed. `None` means a free-form task evaluated on
    /// explicit completion plus proof text.
    pub content_url: Option<String>,
    pub min_duration_seconds: u64,
    pub require_scrolling: bool,
    pub min_scroll_percentage: u8,
    pub require_interaction: bool,
    pub min_ad_clicks: u32,
    pub max_attempts: u32,
    pub time_limit_minutes: u32,
    /// Reward is not auto-granted; accepted submissions park for manual
    /// moderation instead.
    pub requires_review: bool,
}

impl TaskDefinition {
    pub fn has_content(&self) -> bool {
        self.content_url.is_some()
    }
}
