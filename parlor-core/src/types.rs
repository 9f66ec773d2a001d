use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chat-platform user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat room (group or private chat) a session lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub balance: u64,
    pub score: i64, // may go negative
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            balance: 0,
            score: 0,
            created_at: Utc::now(),
        }
    }
}

/// Everything the persistence collaborator needs to rebuild the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: BTreeMap<AccountId, u64>,
    pub display_names: BTreeMap<AccountId, String>,
    pub scores: BTreeMap<AccountId, i64>,
}

impl LedgerSnapshot {
    /// Union of every account id mentioned by any of the three maps.
    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self
            .balances
            .keys()
            .chain(self.display_names.keys())
            .chain(self.scores.keys())
            .copied()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub account: AccountId,
    pub display_name: String,
    pub score: i64,
}
