use crate::error::{ParlorError, Result};
use crate::storage::Storage;
use crate::types::{AccountId, LedgerSnapshot};
use chrono::Utc;
use rusqlite::params;

pub struct AccountStore<'a> {
    storage: &'a Storage,
}

impl<'a> AccountStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Overwrite the stored accounts with `snapshot` in one transaction.
    pub async fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<usize> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();

        tx.execute("DELETE FROM accounts", [])?;
        let ids = snapshot.account_ids();
        for id in &ids {
            let name = snapshot
                .display_names
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.to_string());
            let balance = snapshot.balances.get(id).copied().unwrap_or(0);
            let balance = i64::try_from(balance)
                .map_err(|_| ParlorError::internal(format!("Balance too large for {}", id)))?;
            let score = snapshot.scores.get(id).copied().unwrap_or(0);

            tx.execute(
                "INSERT INTO accounts (id, display_name, balance, score, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.0, name, balance, score, now],
            )?;
        }
        tx.commit()?;

        tracing::debug!("Saved {} accounts", ids.len());
        Ok(ids.len())
    }

    pub async fn load_snapshot(&self) -> Result<LedgerSnapshot> {
        let conn = self.storage.get_connection().await;

        let mut stmt =
            conn.prepare("SELECT id, display_name, balance, score FROM accounts ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(ParlorError::Storage)?;

        let mut snapshot = LedgerSnapshot::default();
        for (id, name, balance, score) in rows {
            let id = AccountId(id);
            snapshot.balances.insert(id, balance.max(0) as u64);
            snapshot.display_names.insert(id, name);
            snapshot.scores.insert(id, score);
        }
        Ok(snapshot)
    }
}
