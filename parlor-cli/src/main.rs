mod commands;
mod config;
mod format;

use clap::{Parser, Subcommand};
use commands::AppState;
use parlor_core::{AccountId, ParlorError, RoomId};
use parlor_games::GameError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parlor")]
#[command(about = "Chat-room mini games: dice, lottery and battle royale")]
#[command(version)]
struct Cli {
    /// Data directory for the account database
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Game settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play in a room, reading actions from stdin
    Play {
        /// Room to play in
        #[arg(short, long, default_value_t = 1)]
        room: i64,
        /// Print outbound events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Grant the starting balance to a new account
    Register {
        /// Account id
        account: i64,
        /// Display name
        name: String,
    },
    /// Show an account's balance and score
    Balance {
        /// Account id
        account: i64,
    },
    /// Show the leaderboard
    Top {
        /// Number of rows
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Export the ledger to a checksummed JSON file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Replace the ledger with a backup file
    Import {
        /// Backup file path
        #[arg(short, long)]
        input: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "parlor={},parlor_core={},parlor_games={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let data_dir = config::resolve_data_dir(cli.data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let state = AppState::open(&data_dir, cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Play { room, json } => commands::play(&state, RoomId(room), json).await,
        Commands::Register { account, name } => {
            commands::register(&state, AccountId(account), &name).await
        }
        Commands::Balance { account } => commands::show_balance(&state, AccountId(account)).await,
        Commands::Top { limit } => commands::show_top(&state, limit).await,
        Commands::Export { output } => commands::export_backup(&state, &output).await,
        Commands::Import { input, yes } => commands::import_backup(&state, &input, yes).await,
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

fn report(e: &anyhow::Error) {
    let core = e
        .downcast_ref::<ParlorError>()
        .or_else(|| match e.downcast_ref::<GameError>() {
            Some(GameError::Core(inner)) => Some(inner),
            _ => None,
        });

    match core {
        Some(ParlorError::InsufficientFunds { need, available }) => {
            eprintln!("Error: Insufficient funds");
            eprintln!(
                "Need: {}, Available: {}",
                format::fmt_amount(*need),
                format::fmt_amount(*available)
            );
        }
        Some(ParlorError::AccountNotFound(id)) => {
            eprintln!("Error: Account {} not found", id);
            eprintln!("Use 'parlor register <account> <name>' to create it");
        }
        Some(ParlorError::ChecksumMismatch { .. }) => {
            eprintln!("Error: Backup file is corrupted or was modified");
        }
        _ => eprintln!("Error: {:#}", e),
    }
}
