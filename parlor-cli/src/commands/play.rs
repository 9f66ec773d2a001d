//! Interactive room on stdin.
//!
//! Each line is `<account> <name> <verb> [args]`, for example
//! `7 hoa bet high 50k` or `7 hoa pick 3,9 10k`. Outbound events are printed
//! as they arrive. The ledger is saved on a timer and once more on exit.

use super::AppState;
use crate::format::{fmt_amount, fmt_signed, parse_amount};
use parlor_core::{AccountId, RoomId};
use parlor_games::{
    ChannelSink, DiceSide, GameEngine, InboundEvent, LobbyMode, OutboundEvent, Reply,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Actions: <account> <name> <verb> [args]
  bet high|low <amount>   lottery   pick <n,n,...> [wager]
  lobby solo|team   join   leave   start   jump   register
Room commands: top, close, help, quit";

#[derive(Debug, PartialEq, Eq)]
pub enum LineCommand {
    Game(InboundEvent),
    Register { account: AccountId, name: String },
    Top,
    Close,
    Help,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<LineCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => return Ok(None),
        [first, ..] if first.starts_with('#') => return Ok(None),
        ["quit"] | ["exit"] => return Ok(Some(LineCommand::Quit)),
        ["top"] => return Ok(Some(LineCommand::Top)),
        ["close"] => return Ok(Some(LineCommand::Close)),
        ["help"] => return Ok(Some(LineCommand::Help)),
        _ => {}
    }

    let [account, name, verb, args @ ..] = words.as_slice() else {
        return Err("Expected <account> <name> <verb>".to_string());
    };
    let account = AccountId(
        account
            .parse()
            .map_err(|_| format!("Invalid account id: {}", account))?,
    );
    let name = name.to_string();

    let event = match (*verb, args) {
        ("bet", [side, amount]) => {
            let choice = match side.to_lowercase().as_str() {
                "high" | "h" => DiceSide::High,
                "low" | "l" => DiceSide::Low,
                other => return Err(format!("Choose high or low, not {}", other)),
            };
            let amount = parse_amount(amount).ok_or_else(|| format!("Invalid amount: {}", amount))?;
            InboundEvent::PlaceBet {
                account,
                name,
                choice,
                amount,
            }
        }
        ("lottery", []) => InboundEvent::OpenLottery { account, name },
        ("pick", [numbers, rest @ ..]) if rest.len() <= 1 => {
            let numbers = numbers
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<u8>().map_err(|_| format!("Invalid number: {}", s)))
                .collect::<Result<Vec<_>, _>>()?;
            let wager = match rest {
                [wager] => parse_amount(wager).ok_or_else(|| format!("Invalid wager: {}", wager))?,
                _ => 0,
            };
            InboundEvent::JoinLottery {
                account,
                name,
                numbers,
                wager,
            }
        }
        ("lobby", [mode]) => {
            let mode = match *mode {
                "solo" => LobbyMode::Solo,
                "team" => LobbyMode::Team,
                other => return Err(format!("Unknown lobby mode: {}", other)),
            };
            InboundEvent::OpenLobby {
                account,
                name,
                mode,
            }
        }
        ("join", []) => InboundEvent::JoinLobby { account, name },
        ("leave", []) => InboundEvent::LeaveLobby { account, name },
        ("start", []) => InboundEvent::StartLobby { account, name },
        ("jump", []) => InboundEvent::JumpEarly { account, name },
        ("register", []) => return Ok(Some(LineCommand::Register { account, name })),
        (verb, _) => return Err(format!("Unknown action or wrong arguments: {}", verb)),
    };
    Ok(Some(LineCommand::Game(event)))
}

pub fn describe_event(event: &OutboundEvent) -> String {
    match event {
        OutboundEvent::RoundOpened {
            kind,
            closes_in_secs,
            ..
        } => format!("{:?} round open, closes in {}s", kind, closes_in_secs),
        OutboundEvent::RoundTick {
            kind,
            remaining_secs,
            bets,
            ..
        } => {
            let total: u64 = bets.iter().map(|b| b.amount).sum();
            format!(
                "{:?} round: {}s left, {} entries, {} staked",
                kind,
                remaining_secs,
                bets.len(),
                fmt_amount(total)
            )
        }
        OutboundEvent::RoundResolved {
            outcome,
            dice,
            breakdown,
            ..
        } => {
            let roll = match dice {
                Some([a, b, c]) => format!("{} + {} + {} = {}", a, b, c, a + b + c),
                None => "repeat".to_string(),
            };
            let mut lines = vec![format!("Dice: {} ({})", outcome.to_string().to_uppercase(), roll)];
            lines.extend(breakdown.iter().map(|line| {
                format!(
                    "  {} {} {} -> {}",
                    line.display_name,
                    line.choice,
                    fmt_amount(line.staked),
                    fmt_signed(line.score_delta)
                )
            }));
            lines.join("\n")
        }
        OutboundEvent::RoundCancelled { kind, refunds, .. } => {
            format!("{:?} round cancelled, {} stakes refunded", kind, refunds.len())
        }
        OutboundEvent::LotteryDrawn {
            results, matches, ..
        } => {
            let mut lines = vec![format!("Lottery draw: {:?}", results)];
            lines.extend(matches.iter().map(|m| {
                format!(
                    "  {} picked {:?}: {} hits, {}",
                    m.display_name,
                    m.picks,
                    m.matches.len(),
                    fmt_signed(m.score_delta)
                )
            }));
            lines.join("\n")
        }
        OutboundEvent::LobbyUpdated {
            mode,
            phase,
            map,
            roster,
            ..
        } => {
            let names: Vec<String> = roster
                .iter()
                .map(|r| match r.team {
                    Some(team) => format!("{}[{}]", r.display_name, team),
                    None => r.display_name.clone(),
                })
                .collect();
            let header = match map {
                Some(map) => format!("{:?} lobby {:?} on {}", mode, phase, map),
                None => format!("{:?} lobby {:?}", mode, phase),
            };
            format!("{}: {}", header, names.join(", "))
        }
        OutboundEvent::PhaseAnnouncement { key, params, .. } => {
            let params: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("{} {}", key, params.join(" "))
        }
        OutboundEvent::LootSummary { loadouts, .. } => {
            let kits: Vec<String> = loadouts
                .iter()
                .map(|l| {
                    let weapons = [&l.secondary, &l.primary]
                        .into_iter()
                        .flatten()
                        .map(|w| w.to_uppercase())
                        .collect::<Vec<_>>()
                        .join(" + ");
                    format!("{}: {} ({} medkits)", l.display_name, weapons, l.medkits)
                })
                .collect();
            format!("loot: {}", kits.join(", "))
        }
        OutboundEvent::EliminationEvent {
            attacker,
            target,
            damage,
            ..
        } => format!("{} eliminated {} ({} dmg)", attacker, target, damage),
        OutboundEvent::MatchResolved {
            winner,
            winning_team,
            reason,
            standings,
            ..
        } => {
            let winner = winner
                .and_then(|id| standings.iter().find(|s| s.account == id))
                .map(|s| s.display_name.clone())
                .unwrap_or_else(|| "nobody".to_string());
            match winning_team {
                Some(team) => format!("Match over ({:?}): team {} wins, led by {}", reason, team, winner),
                None => format!("Match over ({:?}): {} wins", reason, winner),
            }
        }
    }
}

fn describe_reply(reply: &Reply) -> String {
    match reply {
        Reply::BetPlaced(receipt) => format!(
            "bet accepted ({} in round), balance {}",
            receipt.bets_in_round,
            fmt_amount(receipt.balance)
        ),
        Reply::LotteryOpened { created: true, .. } => "lottery opened".to_string(),
        Reply::LotteryOpened { created: false, .. } => "lottery already running".to_string(),
        Reply::LotteryJoined(receipt) => format!(
            "picks {}, balance {}",
            if receipt.replaced { "replaced" } else { "recorded" },
            fmt_amount(receipt.balance)
        ),
        Reply::LobbyOpened { mode, players, .. } => {
            let mode = match mode {
                LobbyMode::Solo => "solo",
                LobbyMode::Team => "team",
            };
            format!("in {} lobby ({} players)", mode, players)
        }
        Reply::LobbyJoined { players } => {
            format!("in lobby ({} players)", players)
        }
        Reply::LobbyLeft(outcome) if outcome.disbanded => "lobby disbanded".to_string(),
        Reply::LobbyLeft(outcome) => format!("left lobby ({} remain)", outcome.remaining),
        Reply::LobbyStarted { started: true, .. } => "match starting".to_string(),
        Reply::LobbyStarted { phase, .. } => format!("match already in {:?}", phase),
        Reply::Jumped { first: true } => "jumped".to_string(),
        Reply::Jumped { first: false } => "already jumped".to_string(),
        Reply::NotRunning(kind) => format!("no {:?} game running here", kind),
    }
}

/// Returns false when the session should end.
async fn dispatch(engine: &GameEngine, room: RoomId, command: LineCommand) -> bool {
    match command {
        LineCommand::Game(event) => match engine.handle(room, event).await {
            Ok(reply) => println!("  > {}", describe_reply(&reply)),
            Err(e) => println!("  ! {}", e),
        },
        LineCommand::Register { account, name } => {
            let (balance, granted) = engine.register(account, &name);
            if granted {
                println!("  > {} registered with {}", name, fmt_amount(balance));
            } else {
                println!("  > {} already registered ({})", name, fmt_amount(balance));
            }
        }
        LineCommand::Top => {
            for entry in engine.leaderboard(10) {
                println!(
                    "  {}. {} {}",
                    entry.rank,
                    entry.display_name,
                    fmt_signed(entry.score)
                );
            }
        }
        LineCommand::Close => {
            let closed = engine.close_room(room).await;
            println!("  > closed {} running games", closed);
        }
        LineCommand::Help => println!("{}", HELP),
        LineCommand::Quit => return false,
    }
    true
}

pub async fn play(state: &AppState, room: RoomId, json: bool) -> anyhow::Result<()> {
    let ledger = state.load_ledger().await?;
    let (sink, mut events) = ChannelSink::new();
    let engine = GameEngine::new(
        ledger.clone(),
        Arc::new(state.config.clone()),
        Arc::new(sink),
    );

    let printer = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            if json {
                match serde_json::to_string(&envelope.event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to encode event: {}", e),
                }
            } else {
                println!("[room {}] {}", envelope.room, describe_event(&envelope.event));
            }
        }
    });

    println!("Playing in room {}. {}", room, HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut autosave = tokio::time::interval(state.config.economy.save_interval);
    autosave.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(Some(command)) => {
                        if !dispatch(&engine, room, command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("  ! {}", message),
                }
            }
            _ = autosave.tick() => {
                match state.save_ledger(&ledger).await {
                    Ok(count) => tracing::debug!("Saved {} accounts", count),
                    Err(e) => tracing::warn!("Periodic save failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    println!("Closing open games...");
    engine.shutdown().await;
    let saved = state.save_ledger(&ledger).await?;
    tracing::info!("Saved {} accounts", saved);

    drop(engine);
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        tracing::debug!("Event printer did not drain in time");
    }
    Ok(())
}
