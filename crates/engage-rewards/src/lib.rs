pub mod ledger;
pub mod storage;

pub use ledger::RewardLedger;
pub use storage::{CreditRecord, LedgerStorage, MemoryLedger};
