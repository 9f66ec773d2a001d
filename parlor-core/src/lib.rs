//! parlor core - ledger, configuration and persistence
//!
//! This library owns the state that outlives any single game: account
//! balances, leaderboard scores, tunable game settings and the sqlite
//! snapshot store.

pub mod backup;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

pub use config::{BattleConfig, DiceConfig, EconomyConfig, GameConfig, LotteryConfig};
pub use error::{ParlorError, Result};
pub use ledger::EconomyLedger;
pub use types::{Account, AccountId, LeaderboardEntry, LedgerSnapshot, RoomId};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AccountStore, Storage};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_ledger_persists_through_storage() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(&temp_dir.path().join("parlor.db"))
            .await
            .unwrap();

        let ledger = EconomyLedger::new();
        ledger.register(AccountId(3), "an", 100_000);
        ledger.debit(AccountId(3), 40_000).unwrap();

        AccountStore::new(&storage)
            .save_snapshot(&ledger.snapshot())
            .await
            .unwrap();

        let reloaded = EconomyLedger::new();
        reloaded.restore(&AccountStore::new(&storage).load_snapshot().await.unwrap());
        assert_eq!(reloaded.balance(AccountId(3)), 60_000);
        assert_eq!(reloaded.display_name(AccountId(3)), "an");
    }
}
