use super::AppState;
use crate::format::{fmt_amount, fmt_signed};
use comfy_table::{presets::UTF8_FULL, Table};
use parlor_core::AccountId;

pub async fn register(state: &AppState, account: AccountId, name: &str) -> anyhow::Result<()> {
    let ledger = state.load_ledger().await?;
    let grant = state.config.economy.registration_grant;
    let (balance, granted) = ledger.register(account, name, grant);
    state.save_ledger(&ledger).await?;

    if granted {
        println!("Registered {} ({}) with {}", name, account, fmt_amount(balance));
    } else {
        println!(
            "{} ({}) is already registered, balance {}",
            name,
            account,
            fmt_amount(balance)
        );
    }
    Ok(())
}

pub async fn show_balance(state: &AppState, account: AccountId) -> anyhow::Result<()> {
    let ledger = state.load_ledger().await?;
    let account = ledger.account(account)?;

    println!("Account {} ({}):", account.id, account.display_name);
    println!("  Balance: {} ({})", fmt_amount(account.balance), account.balance);
    println!("  Score: {}", fmt_signed(account.score));
    Ok(())
}

pub async fn show_top(state: &AppState, limit: usize) -> anyhow::Result<()> {
    let ledger = state.load_ledger().await?;
    let entries = ledger.leaderboard(limit);

    if entries.is_empty() {
        println!("No accounts yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Rank", "Account", "Name", "Score"]);
    for entry in entries {
        table.add_row(vec![
            entry.rank.to_string(),
            entry.account.to_string(),
            entry.display_name,
            fmt_signed(entry.score),
        ]);
    }
    println!("{}", table);
    Ok(())
}
