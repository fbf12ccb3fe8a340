use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engage_types::{AttemptId, RewardAmount, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// One reward grant, keyed by the attempt that earned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRecord {
    pub user: UserId,
    pub attempt_id: AttemptId,
    pub amount: RewardAmount,
    pub timestamp: DateTime<Utc>,
}

type BalanceMap = HashMap<UserId, RewardAmount>;
type CreditMap = HashMap<AttemptId, CreditRecord>;
type TransactionBackup = Option<(BalanceMap, CreditMap)>;

#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_balance(&self, user: &UserId) -> Result<RewardAmount>;
    async fn set_balance(&self, user: &UserId, balance: RewardAmount) -> Result<()>;

    /// The credit record for an attempt, if one was ever written. This is
    /// the idempotence key for reward crediting.
    async fn get_credit(&self, attempt_id: AttemptId) -> Result<Option<CreditRecord>>;
    async fn record_credit(&self, record: CreditRecord) -> Result<()>;
    async fn credits_for_user(&self, user: &UserId) -> Result<Vec<CreditRecord>>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

/// In-memory ledger backend. The production deployment talks to the
/// platform's relational store through this same trait.
pub struct MemoryLedger {
    balances: Arc<RwLock<BalanceMap>>,
    credits: Arc<RwLock<CreditMap>>,
    transaction_backup: Arc<RwLock<TransactionBackup>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            credits: Arc::new(RwLock::new(HashMap::new())),
            transaction_backup: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl LedgerStorage for MemoryLedger {
    async fn get_balance(&self, user: &UserId) -> Result<RewardAmount> {
        let balances = self.balances.read().await;
        Ok(balances.get(user).copied().unwrap_or(RewardAmount::ZERO))
    }

    async fn set_balance(&self, user: &UserId, balance: RewardAmount) -> Result<()> {
        let mut balances = self.balances.write().await;
        if balance == RewardAmount::ZERO {
            balances.remove(user);
        } else {
            balances.insert(user.clone(), balance);
        }
        Ok(())
    }

    async fn get_credit(&self, attempt_id: AttemptId) -> Result<Option<CreditRecord>> {
        let credits = self.credits.read().await;
        Ok(credits.get(&attempt_id).cloned())
    }

    async fn record_credit(&self, record: CreditRecord) -> Result<()> {
        let mut credits = self.credits.write().await;
        info!(
            user = %record.user,
            attempt_id = %record.attempt_id,
            amount = %record.amount,
            "📦 Credit recorded"
        );
        credits.insert(record.attempt_id, record);
        Ok(())
    }

    async fn credits_for_user(&self, user: &UserId) -> Result<Vec<CreditRecord>> {
        let credits = self.credits.read().await;
        let mut records: Vec<CreditRecord> = credits
            .values()
            .filter(|record| &record.user == user)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let balances = self.balances.read().await;
        let credits = self.credits.read().await;
        let mut backup = self.transaction_backup.write().await;
        *backup = Some((balances.clone(), credits.clone()));
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        *backup = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        if let Some((balance_backup, credit_backup)) = backup.take() {
            let mut balances = self.balances.write().await;
            let mut credits = self.credits.write().await;
            *balances = balance_backup;
            *credits = credit_backup;
            info!("❌ Ledger transaction rolled back (snapshot restored)");
        }
        Ok(())
    }
}
