use crate::error::EngageError;
use serde::{Deserialize, Serialize};

/// Per-user eligibility, derived on every task-list fetch from account,
/// region and referral data. Never persisted as primary truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibilitySnapshot {
    pub region_blocked: bool,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    /// Trial window elapsed with zero qualifying referrals. Hard gate.
    pub referral_required: bool,
    pub daily_completions_used: u32,
    pub daily_quota: u32,
    pub account_disabled: bool,
}

impl EligibilitySnapshot {
    pub fn quota_reached(&self) -> bool {
        self.daily_completions_used >= self.daily_quota
    }

    /// First blocking condition in severity order, or `None` when an
    /// attempt may move into progress.
    pub fn deny_reason(&self) -> Option<EngageError> {
        if self.account_disabled {
            return Some(EngageError::AccessDisabled);
        }
        if self.region_blocked {
            return Some(EngageError::RegionBlocked {
                code: self.region_code.clone().unwrap_or_default(),
                name: self.region_name.clone().unwrap_or_default(),
            });
        }
        if self.referral_required {
            return Some(EngageError::ReferralRequired);
        }
        if self.quota_reached() {
            return Some(EngageError::QuotaExceeded);
        }
        None
    }

    pub fn allows_start(&self) -> bool {
        self.deny_reason().is_none()
    }
}
