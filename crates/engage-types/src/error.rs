use crate::attempt::{AttemptState, RejectReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngageError {
    #[error("Region blocked: {name} ({code})")]
    RegionBlocked { code: String, name: String },

    #[error("Referral required before tasks can be started")]
    ReferralRequired,

    #[error("Daily completion quota exceeded")]
    QuotaExceeded,

    #[error("Attempt not found: {0}")]
    AttemptNotFound(String),

    #[error("Attempt expired past its time limit")]
    AttemptExpired,

    #[error("Insufficient engagement signal: {0}")]
    InsufficientSignal(RejectReason),

    #[error("Account access disabled")]
    AccessDisabled,

    #[error("No attempts remaining for task")]
    AttemptsExhausted,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: AttemptState, to: AttemptState },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngageError {
    /// Machine-readable code; the UI routes remedial action on this,
    /// never on the message text.
    pub fn code(&self) -> &'static str {
        match self {
            EngageError::RegionBlocked { .. } => "region-blocked",
            EngageError::ReferralRequired => "referral-required",
            EngageError::QuotaExceeded => "quota-exceeded",
            EngageError::AttemptNotFound(_) => "attempt-not-found",
            EngageError::AttemptExpired => "attempt-expired",
            EngageError::InsufficientSignal(reason) => reason.code(),
            EngageError::AccessDisabled => "access-disabled",
            EngageError::AttemptsExhausted => "attempts-exhausted",
            EngageError::TaskNotFound(_) => "task-not-found",
            EngageError::InvalidTransition { .. } => "invalid-transition",
            EngageError::Storage(_) => "storage",
            EngageError::Serialization(_) => "serialization",
            EngageError::Configuration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for EngageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngageError>;
