//! Number-draw lottery with a fixed entry window.

use crate::context::GameContext;
use crate::dice::Bet;
use crate::error::{GameError, Result};
use crate::events::{BetSummary, GameKind, LotteryMatch, OutboundEvent};
use crate::phase::RoundPhase;
use crate::registry::{Session, SessionRegistry};
use crate::supervisor::TaskSupervisor;
use parking_lot::Mutex;
use parlor_core::{AccountId, EconomyLedger, LotteryConfig, RoomId};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

pub type LotteryEntry = Bet<Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReceipt {
    pub round_id: Uuid,
    pub balance: u64,
    pub replaced: bool,
}

/// Picks must be non-empty, distinct, within range and at most `max_picks`.
pub fn validate_picks(numbers: &[u8], config: &LotteryConfig) -> Result<()> {
    if numbers.is_empty() || numbers.len() > config.max_picks {
        return Err(GameError::validation(format!(
            "Pick between 1 and {} numbers",
            config.max_picks
        )));
    }
    if let Some(n) = numbers
        .iter()
        .find(|n| !(config.min_number..=config.max_number).contains(*n))
    {
        return Err(GameError::validation(format!(
            "Number {} is outside {}..={}",
            n, config.min_number, config.max_number
        )));
    }
    for (i, n) in numbers.iter().enumerate() {
        if numbers[..i].contains(n) {
            return Err(GameError::validation(format!("Number {} picked twice", n)));
        }
    }
    Ok(())
}

/// Draw a sequence of random length; values may repeat.
pub fn draw_numbers<R: Rng + ?Sized>(rng: &mut R, config: &LotteryConfig) -> Vec<u8> {
    let len = rng.gen_range(config.min_draws..=config.max_draws);
    (0..len)
        .map(|_| rng.gen_range(config.min_number..=config.max_number))
        .collect()
}

/// Every drawn value that appears in `picks`, once per occurrence.
pub fn count_matches(results: &[u8], picks: &[u8]) -> Vec<u8> {
    results
        .iter()
        .filter(|n| picks.contains(n))
        .copied()
        .collect()
}

pub fn settle_entries(
    ledger: &EconomyLedger,
    entries: &[LotteryEntry],
    results: &[u8],
    multiplier: u64,
) -> Vec<LotteryMatch> {
    entries
        .iter()
        .map(|entry| {
            let matches = count_matches(results, &entry.choice);
            let payout = entry
                .amount
                .saturating_mul(multiplier)
                .saturating_mul(matches.len() as u64);
            if payout > 0 {
                if let Err(e) = ledger.credit(entry.account, payout) {
                    tracing::error!("Failed to pay {} to {}: {}", payout, entry.account, e);
                }
            }
            let score_delta = payout as i64 - entry.amount as i64;
            if score_delta != 0 {
                ledger.adjust_score(entry.account, score_delta);
            }

            LotteryMatch {
                account: entry.account,
                display_name: entry.display_name.clone(),
                picks: entry.choice.clone(),
                matches,
                wager: entry.amount,
                payout,
                score_delta,
            }
        })
        .collect()
}

struct LotteryState {
    phase: RoundPhase,
    entries: Vec<LotteryEntry>,
    rng: StdRng,
}

pub struct LotteryRound {
    id: Uuid,
    room: RoomId,
    ctx: GameContext,
    deadline: Instant,
    state: Mutex<LotteryState>,
    supervisor: TaskSupervisor,
}

impl LotteryRound {
    pub fn new(room: RoomId, ctx: GameContext) -> Self {
        let deadline = Instant::now() + ctx.config.lottery.window;
        let rng = ctx.session_rng();
        Self {
            id: Uuid::new_v4(),
            room,
            ctx,
            deadline,
            state: Mutex::new(LotteryState {
                phase: RoundPhase::Open,
                entries: Vec::new(),
                rng,
            }),
            supervisor: TaskSupervisor::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> RoundPhase {
        self.state.lock().phase
    }

    pub fn entries(&self) -> Vec<LotteryEntry> {
        self.state.lock().entries.clone()
    }

    /// Record the account's picks, replacing any earlier entry. Only the
    /// difference between the old and new wager moves through the ledger.
    pub fn join(
        &self,
        account: AccountId,
        display_name: &str,
        numbers: Vec<u8>,
        wager: u64,
    ) -> Result<EntryReceipt> {
        validate_picks(&numbers, &self.ctx.config.lottery)?;

        let mut state = self.state.lock();
        if !state.phase.is_open() {
            return Err(GameError::RoundClosed);
        }

        let existing = state.entries.iter().position(|e| e.account == account);
        let previous_wager = existing.map_or(0, |i| state.entries[i].amount);
        let balance = if wager >= previous_wager {
            self.ctx.ledger.debit(account, wager - previous_wager)?
        } else {
            self.ctx.ledger.credit(account, previous_wager - wager)?
        };

        let entry = Bet {
            account,
            display_name: display_name.to_string(),
            choice: numbers,
            amount: wager,
        };
        match existing {
            Some(i) => state.entries[i] = entry,
            None => state.entries.push(entry),
        }

        tracing::debug!("Lottery {} entry from {} ({})", self.id, account, wager);
        Ok(EntryReceipt {
            round_id: self.id,
            balance,
            replaced: existing.is_some(),
        })
    }

    async fn run(self: Arc<Self>, registry: Arc<SessionRegistry<Self>>) {
        let config = self.ctx.config.lottery.clone();
        let mut shutdown = self.supervisor.signal();

        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::RoundOpened {
                    kind: GameKind::Lottery,
                    round_id: self.id,
                    closes_in_secs: config.window.as_secs(),
                },
            )
            .await;

        let mut ticker =
            tokio::time::interval_at(Instant::now() + config.tick_interval, config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                closed = shutdown.sleep_until(self.deadline) => {
                    if closed.is_err() {
                        self.cancel().await;
                        registry.release(self.room, &self);
                        return;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    self.ctx.notifier.send(self.room, self.tick_event()).await;
                }
            }
        }

        self.resolve().await;
        registry.release(self.room, &self);
    }

    fn tick_event(&self) -> OutboundEvent {
        let bets = self
            .state
            .lock()
            .entries
            .iter()
            .map(|e| BetSummary {
                account: e.account,
                display_name: e.display_name.clone(),
                choice: format!("{:?}", e.choice),
                amount: e.amount,
            })
            .collect();
        OutboundEvent::RoundTick {
            kind: GameKind::Lottery,
            round_id: self.id,
            remaining_secs: self
                .deadline
                .saturating_duration_since(Instant::now())
                .as_secs(),
            bets,
        }
    }

    /// Draw and settle. `None` if the round already closed.
    pub async fn resolve(&self) -> Option<Vec<u8>> {
        let config = &self.ctx.config.lottery;
        let (entries, results) = {
            let mut state = self.state.lock();
            state.phase.transition(RoundPhase::Resolved).ok()?;
            let results = draw_numbers(&mut state.rng, config);
            (std::mem::take(&mut state.entries), results)
        };

        let matches = settle_entries(&self.ctx.ledger, &entries, &results, config.match_multiplier);
        tracing::info!(
            "Lottery {} in room {} drew {:?} for {} entries",
            self.id,
            self.room,
            results,
            matches.len()
        );

        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::LotteryDrawn {
                    round_id: self.id,
                    results: results.clone(),
                    matches,
                },
            )
            .await;
        Some(results)
    }

    async fn cancel(&self) {
        let entries = {
            let mut state = self.state.lock();
            if state.phase.transition(RoundPhase::Cancelled).is_err() {
                return;
            }
            std::mem::take(&mut state.entries)
        };

        let mut refunds = Vec::new();
        for entry in entries.into_iter().filter(|e| e.amount > 0) {
            match self.ctx.ledger.credit(entry.account, entry.amount) {
                Ok(_) => refunds.push((entry.account, entry.amount)),
                Err(e) => tracing::error!("Failed to refund {}: {}", entry.account, e),
            }
        }

        tracing::warn!("Lottery {} in room {} cancelled", self.id, self.room);
        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::RoundCancelled {
                    kind: GameKind::Lottery,
                    round_id: self.id,
                    refunds,
                },
            )
            .await;
    }
}

impl Session for LotteryRound {
    const KIND: GameKind = GameKind::Lottery;

    fn room(&self) -> RoomId {
        self.room
    }

    fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    fn on_created(self: &Arc<Self>, registry: &Arc<SessionRegistry<Self>>) {
        self.supervisor.spawn(self.clone().run(registry.clone()));
    }
}
