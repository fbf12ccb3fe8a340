use crate::storage::{CreditRecord, LedgerStorage};
use anyhow::{bail, Result};
use chrono::Utc;
use engage_types::{AttemptId, RewardAmount, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Reward accounting for accepted attempts. The submission arbiter is the
/// only caller of [`RewardLedger::credit_reward`]; everything else is
/// read-only reporting.
pub struct RewardLedger {
    storage: Arc<dyn LedgerStorage>,
    cache: Arc<RwLock<HashMap<UserId, RewardAmount>>>,
    /// Serializes credits so the duplicate check and the balance write are
    /// one atomic step per attempt id.
    credit_lock: Mutex<()>,
}

impl RewardLedger {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self {
            storage,
            cache: Arc::new(RwLock::new(HashMap::new())),
            credit_lock: Mutex::new(()),
        }
    }

    pub async fn balance_of(&self, user: &UserId) -> Result<RewardAmount> {
        {
            let cache = self.cache.read().await;
            if let Some(balance) = cache.get(user) {
                return Ok(*balance);
            }
        }

        let balance = self.storage.get_balance(user).await?;
        let mut cache = self.cache.write().await;
        cache.insert(user.clone(), balance);
        Ok(balance)
    }

    /// Credit `amount` to `user` for `attempt_id`, at most once.
    ///
    /// Returns `true` when the balance moved, `false` when the attempt was
    /// already credited (duplicate submissions are a no-op, never a double
    /// payment).
    pub async fn credit_reward(
        &self,
        user: &UserId,
        amount: RewardAmount,
        attempt_id: AttemptId,
    ) -> Result<bool> {
        let _guard = self.credit_lock.lock().await;

        if let Some(existing) = self.storage.get_credit(attempt_id).await? {
            debug!(
                user = %user,
                attempt_id = %attempt_id,
                amount = %existing.amount,
                "Duplicate credit short-circuited"
            );
            return Ok(false);
        }

        if amount > RewardAmount::MAX_GRANT {
            bail!("Reward {} exceeds the single-grant ceiling", amount);
        }

        self.storage.begin_transaction().await?;
        match self.credit_internal(user, amount, attempt_id).await {
            Ok(balance_after) => {
                self.storage.commit_transaction().await?;

                let mut cache = self.cache.write().await;
                cache.insert(user.clone(), balance_after);

                info!(
                    user = %user,
                    attempt_id = %attempt_id,
                    amount = %amount,
                    balance_after = %balance_after,
                    "💰 Reward credited"
                );
                Ok(true)
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn credit_internal(
        &self,
        user: &UserId,
        amount: RewardAmount,
        attempt_id: AttemptId,
    ) -> Result<RewardAmount> {
        let current = self.storage.get_balance(user).await?;
        let new_balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {}", user))?;

        self.storage.set_balance(user, new_balance).await?;
        self.storage
            .record_credit(CreditRecord {
                user: user.clone(),
                attempt_id,
                amount,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(new_balance)
    }

    pub async fn credit_for_attempt(&self, attempt_id: AttemptId) -> Result<Option<CreditRecord>> {
        self.storage.get_credit(attempt_id).await
    }

    pub async fn history_for_user(&self, user: &UserId) -> Result<Vec<CreditRecord>> {
        self.storage.credits_for_user(user).await
    }
}
