pub mod accounts;
pub mod backup;
pub mod play;

pub use accounts::{register, show_balance, show_top};
pub use backup::{export_backup, import_backup};
pub use play::play;

use crate::config;
use parlor_core::storage::{AccountStore, Storage};
use parlor_core::{EconomyLedger, GameConfig};
use std::path::Path;
use std::sync::Arc;

const DATABASE_FILE: &str = "parlor.db";

/// Storage and settings shared by every subcommand.
pub struct AppState {
    pub storage: Arc<Storage>,
    pub config: GameConfig,
}

impl AppState {
    pub async fn open(data_dir: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = config::load_game_config(config_path, data_dir).await?;
        let storage = Storage::new(&data_dir.join(DATABASE_FILE)).await?;
        Ok(Self {
            storage: Arc::new(storage),
            config,
        })
    }

    pub async fn load_ledger(&self) -> parlor_core::Result<Arc<EconomyLedger>> {
        let snapshot = AccountStore::new(&self.storage).load_snapshot().await?;
        let ledger = EconomyLedger::new();
        ledger.restore(&snapshot);
        Ok(Arc::new(ledger))
    }

    pub async fn save_ledger(&self, ledger: &EconomyLedger) -> parlor_core::Result<usize> {
        AccountStore::new(&self.storage)
            .save_snapshot(&ledger.snapshot())
            .await
    }
}
