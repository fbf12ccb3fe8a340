use crate::region::RegionPolicy;
use chrono::{DateTime, Duration, Utc};
use engage_types::{EligibilitySnapshot, EngineParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Externally supplied facts about a user. The gate never determines
/// region or account status itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityInputs {
    pub region_code: Option<String>,
    pub account_disabled: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub registered_at: DateTime<Utc>,
    pub qualifying_referrals: u32,
}

/// Start of the rolling window daily completions are counted over.
pub fn quota_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(24)
}

/// Computes a fresh [`EligibilitySnapshot`] on every task-list fetch,
/// independent of any single attempt.
#[derive(Debug, Clone)]
pub struct EligibilityGate {
    policy: RegionPolicy,
    params: EngineParams,
}

impl EligibilityGate {
    pub fn new(policy: RegionPolicy, params: EngineParams) -> Self {
        Self { policy, params }
    }

    pub fn evaluate(
        &self,
        inputs: &EligibilityInputs,
        completions_in_window: u32,
        now: DateTime<Utc>,
    ) -> EligibilitySnapshot {
        let (region_blocked, region_code, region_name) = match &inputs.region_code {
            Some(code) => match self.policy.blocked_name(code) {
                Some(name) => (true, Some(code.clone()), Some(name.to_string())),
                None => (false, Some(code.clone()), None),
            },
            None => (false, None, None),
        };

        let trial_elapsed =
            now - inputs.registered_at > Duration::days(self.params.trial_window_days);
        let referral_required = trial_elapsed && inputs.qualifying_referrals == 0;

        let snapshot = EligibilitySnapshot {
            region_blocked,
            region_code,
            region_name,
            referral_required,
            daily_completions_used: completions_in_window,
            daily_quota: self.params.daily_quota,
            account_disabled: inputs.account_disabled,
        };

        debug!(
            region_blocked = snapshot.region_blocked,
            referral_required = snapshot.referral_required,
            completions_used = snapshot.daily_completions_used,
            quota = snapshot.daily_quota,
            "Eligibility evaluated"
        );

        snapshot
    }
}
