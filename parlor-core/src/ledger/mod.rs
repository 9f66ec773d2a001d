//! Authoritative balances and leaderboard scores.
//!
//! Every account sits behind its own mutex so two sessions settling at the
//! same time only contend when they touch the same account. The outer map
//! lock is held just long enough to find or insert the account handle.

use crate::error::{ParlorError, Result};
use crate::types::{Account, AccountId, LeaderboardEntry, LedgerSnapshot};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

type AccountHandle = Arc<Mutex<Account>>;

#[derive(Default)]
pub struct EconomyLedger {
    accounts: RwLock<HashMap<AccountId, AccountHandle>>,
}

impl EconomyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: AccountId) -> Option<AccountHandle> {
        self.accounts.read().get(&id).cloned()
    }

    fn handle_or_create(&self, id: AccountId, display_name: Option<&str>) -> AccountHandle {
        if let Some(handle) = self.handle(id) {
            return handle;
        }

        let mut accounts = self.accounts.write();
        accounts
            .entry(id)
            .or_insert_with(|| {
                let name = display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string());
                tracing::debug!("Created account {} ({})", id, name);
                Arc::new(Mutex::new(Account::new(id, name)))
            })
            .clone()
    }

    /// Create the account on first interaction and keep its display name fresh.
    pub fn ensure_account(&self, id: AccountId, display_name: &str) {
        let handle = self.handle_or_create(id, Some(display_name));
        let mut account = handle.lock();
        if !display_name.is_empty() && account.display_name != display_name {
            account.display_name = display_name.to_string();
        }
    }

    /// Grant the starting balance once. Returns the balance after the call and
    /// whether the grant was applied.
    pub fn register(&self, id: AccountId, display_name: &str, grant: u64) -> (u64, bool) {
        self.ensure_account(id, display_name);
        let handle = self.handle_or_create(id, Some(display_name));
        let mut account = handle.lock();
        if account.balance > 0 {
            return (account.balance, false);
        }
        account.balance = grant;
        tracing::info!("Registered account {} with {}", id, grant);
        (account.balance, true)
    }

    pub fn debit(&self, id: AccountId, amount: u64) -> Result<u64> {
        let handle = match self.handle(id) {
            Some(handle) => handle,
            None if amount == 0 => return Ok(0),
            None => {
                return Err(ParlorError::InsufficientFunds {
                    need: amount,
                    available: 0,
                })
            }
        };

        let mut account = handle.lock();
        if account.balance < amount {
            return Err(ParlorError::InsufficientFunds {
                need: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        Ok(account.balance)
    }

    pub fn credit(&self, id: AccountId, amount: u64) -> Result<u64> {
        let handle = self.handle_or_create(id, None);
        let mut account = handle.lock();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| ParlorError::internal(format!("Balance overflow for {}", id)))?;
        Ok(account.balance)
    }

    pub fn adjust_score(&self, id: AccountId, delta: i64) -> i64 {
        let handle = self.handle_or_create(id, None);
        let mut account = handle.lock();
        account.score = account.score.saturating_add(delta);
        account.score
    }

    pub fn balance(&self, id: AccountId) -> u64 {
        self.handle(id).map_or(0, |handle| handle.lock().balance)
    }

    pub fn account(&self, id: AccountId) -> Result<Account> {
        self.handle(id)
            .map(|handle| handle.lock().clone())
            .ok_or(ParlorError::AccountNotFound(id))
    }

    pub fn display_name(&self, id: AccountId) -> String {
        self.handle(id)
            .map(|handle| handle.lock().display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Highest scores first; equal scores ordered by account id.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(AccountId, String, i64)> = self
            .accounts
            .read()
            .values()
            .map(|handle| {
                let account = handle.lock();
                (account.id, account.display_name.clone(), account.score)
            })
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (account, display_name, score))| LeaderboardEntry {
                rank: i + 1,
                account,
                display_name,
                score,
            })
            .collect()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for handle in self.accounts.read().values() {
            let account = handle.lock();
            snapshot.balances.insert(account.id, account.balance);
            snapshot
                .display_names
                .insert(account.id, account.display_name.clone());
            snapshot.scores.insert(account.id, account.score);
        }
        snapshot
    }

    /// Replace the whole ledger with `snapshot`.
    pub fn restore(&self, snapshot: &LedgerSnapshot) {
        let mut restored = HashMap::new();
        for id in snapshot.account_ids() {
            let name = snapshot
                .display_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string());
            let mut account = Account::new(id, name);
            account.balance = snapshot.balances.get(&id).copied().unwrap_or(0);
            account.score = snapshot.scores.get(&id).copied().unwrap_or(0);
            restored.insert(id, Arc::new(Mutex::new(account)));
        }

        let count = restored.len();
        *self.accounts.write() = restored;
        tracing::info!("Restored ledger with {} accounts", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_rejects_overdraw() {
        let ledger = EconomyLedger::new();
        let alice = AccountId(1);
        ledger.credit(alice, 500).unwrap();

        assert_eq!(ledger.debit(alice, 200).unwrap(), 300);
        let err = ledger.debit(alice, 301).unwrap_err();
        assert!(matches!(
            err,
            ParlorError::InsufficientFunds {
                need: 301,
                available: 300
            }
        ));
        assert_eq!(ledger.balance(alice), 300);
    }

    #[test]
    fn test_debit_unknown_account() {
        let ledger = EconomyLedger::new();
        assert!(ledger.debit(AccountId(9), 1).is_err());
        assert_eq!(ledger.debit(AccountId(9), 0).unwrap(), 0);
    }

    #[test]
    fn test_register_grants_once() {
        let ledger = EconomyLedger::new();
        let bob = AccountId(2);

        assert_eq!(ledger.register(bob, "bob", 100_000), (100_000, true));
        assert_eq!(ledger.register(bob, "bob", 100_000), (100_000, false));

        ledger.debit(bob, 100_000).unwrap();
        assert_eq!(ledger.register(bob, "bob", 100_000), (100_000, true));
    }

    #[test]
    fn test_leaderboard_order() {
        let ledger = EconomyLedger::new();
        ledger.ensure_account(AccountId(1), "a");
        ledger.ensure_account(AccountId(2), "b");
        ledger.ensure_account(AccountId(3), "c");
        ledger.adjust_score(AccountId(1), -50);
        ledger.adjust_score(AccountId(2), 300);
        ledger.adjust_score(AccountId(3), 300);

        let top = ledger.leaderboard(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].account, AccountId(2));
        assert_eq!(top[1].account, AccountId(3));
        assert_eq!(top[1].rank, 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let ledger = EconomyLedger::new();
        ledger.ensure_account(AccountId(7), "seven");
        ledger.credit(AccountId(7), 1_000).unwrap();
        ledger.adjust_score(AccountId(7), -250);

        let snapshot = ledger.snapshot();
        let other = EconomyLedger::new();
        other.restore(&snapshot);

        let account = other.account(AccountId(7)).unwrap();
        assert_eq!(account.display_name, "seven");
        assert_eq!(account.balance, 1_000);
        assert_eq!(account.score, -250);
        assert_eq!(other.snapshot(), snapshot);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(EconomyLedger::new());
        let id = AccountId(11);
        ledger.credit(id, 1_000).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    (0..50).filter(|_| ledger.debit(id, 7).is_ok()).count() as u64
                })
            })
            .collect();

        let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(succeeded, 1_000 / 7);
        assert_eq!(ledger.balance(id), 1_000 - succeeded * 7);
    }
}
