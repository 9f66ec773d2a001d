use super::AppState;
use anyhow::Context;
use dialoguer::Confirm;
use parlor_core::backup::BackupManager;
use std::path::Path;

pub async fn export_backup(state: &AppState, output: &Path) -> anyhow::Result<()> {
    println!("Exporting ledger...");

    let backup = BackupManager::new(state.storage.clone())
        .export_to_file(output)
        .await?;

    println!(
        "Exported {} accounts to {}",
        backup.account_count,
        output.display()
    );
    println!("Checksum: {}", backup.checksum);
    Ok(())
}

pub async fn import_backup(state: &AppState, input: &Path, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirm = Confirm::new()
            .with_prompt("This replaces every stored balance and score. Continue?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirm {
            println!("Import cancelled.");
            return Ok(());
        }
    }

    println!("Importing ledger...");
    let snapshot = BackupManager::new(state.storage.clone())
        .import_from_file(input)
        .await?;

    println!(
        "Imported {} accounts from {}",
        snapshot.account_ids().len(),
        input.display()
    );
    Ok(())
}
