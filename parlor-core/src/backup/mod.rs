use crate::error::{ParlorError, Result};
use crate::storage::{AccountStore, Storage};
use crate::types::LedgerSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

const BACKUP_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerBackup {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub account_count: usize,
    pub checksum: String,
    pub snapshot: LedgerSnapshot,
}

impl LedgerBackup {
    pub fn new(snapshot: LedgerSnapshot) -> Result<Self> {
        let checksum = calculate_checksum(&snapshot)?;
        Ok(Self {
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            account_count: snapshot.account_ids().len(),
            checksum,
            snapshot,
        })
    }

    /// Check version and checksum, handing back the snapshot on success.
    pub fn verify(self) -> Result<LedgerSnapshot> {
        if self.version != BACKUP_VERSION {
            return Err(ParlorError::validation(format!(
                "Unsupported backup version {}",
                self.version
            )));
        }

        let computed = calculate_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(ParlorError::ChecksumMismatch {
                expected: self.checksum,
                computed,
            });
        }
        Ok(self.snapshot)
    }
}

pub struct BackupManager {
    storage: Arc<Storage>,
}

impl BackupManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Export the stored ledger to a JSON file.
    pub async fn export_to_file(&self, file_path: &Path) -> Result<LedgerBackup> {
        let snapshot = AccountStore::new(&self.storage).load_snapshot().await?;
        let backup = LedgerBackup::new(snapshot)?;
        let backup_json = serde_json::to_string_pretty(&backup)?;

        tokio::fs::write(file_path, backup_json).await?;
        tracing::info!(
            "Exported {} accounts to {}",
            backup.account_count,
            file_path.display()
        );
        Ok(backup)
    }

    /// Verify a backup file and replace the stored ledger with it.
    pub async fn import_from_file(&self, file_path: &Path) -> Result<LedgerSnapshot> {
        let backup_json = tokio::fs::read_to_string(file_path).await?;
        let backup: LedgerBackup = serde_json::from_str(&backup_json)?;
        let snapshot = backup.verify()?;

        let count = AccountStore::new(&self.storage)
            .save_snapshot(&snapshot)
            .await?;
        tracing::info!("Imported {} accounts from {}", count, file_path.display());
        Ok(snapshot)
    }
}

/// SHA256 over the canonical JSON encoding of the snapshot.
fn calculate_checksum(snapshot: &LedgerSnapshot) -> Result<String> {
    let bytes = serde_json::to_vec(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;
    use tempfile::tempdir;

    fn sample_snapshot() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.balances.insert(AccountId(5), 900);
        snapshot.display_names.insert(AccountId(5), "mai".to_string());
        snapshot.scores.insert(AccountId(5), 120);
        snapshot
    }

    #[test]
    fn test_tampered_backup_rejected() {
        let mut backup = LedgerBackup::new(sample_snapshot()).unwrap();
        backup.snapshot.balances.insert(AccountId(5), 9_000_000);

        let result = backup.verify();
        assert!(matches!(result, Err(ParlorError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn test_export_import_through_storage() {
        let temp_dir = tempdir().unwrap();
        let source = Arc::new(Storage::new(&temp_dir.path().join("a.db")).await.unwrap());
        AccountStore::new(&source)
            .save_snapshot(&sample_snapshot())
            .await
            .unwrap();

        let file = temp_dir.path().join("ledger.json");
        let exported = BackupManager::new(source).export_to_file(&file).await.unwrap();
        assert_eq!(exported.account_count, 1);

        let target = Arc::new(Storage::new(&temp_dir.path().join("b.db")).await.unwrap());
        let imported = BackupManager::new(target.clone())
            .import_from_file(&file)
            .await
            .unwrap();
        assert_eq!(imported, sample_snapshot());

        let stored = AccountStore::new(&target).load_snapshot().await.unwrap();
        assert_eq!(stored, sample_snapshot());
    }
}
