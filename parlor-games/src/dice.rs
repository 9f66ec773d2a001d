//! High/low dice wager rounds.
//!
//! A round opens with the first bet in a room and closes on whichever comes
//! first: the countdown deadline, or a quiet period after the latest bet. Both
//! conditions are checked on a fixed poll, so the close can trail the trigger
//! by up to one poll interval.

use crate::context::GameContext;
use crate::error::{GameError, Result};
use crate::events::{BetSummary, DiceSide, GameKind, OutboundEvent, PayoutLine};
use crate::phase::RoundPhase;
use crate::registry::{Session, SessionRegistry};
use crate::supervisor::TaskSupervisor;
use parking_lot::Mutex;
use parlor_core::{AccountId, DiceConfig, EconomyLedger, RoomId};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Bet<C> {
    pub account: AccountId,
    pub display_name: String,
    pub choice: C,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetReceipt {
    pub round_id: Uuid,
    pub balance: u64,
    pub bets_in_round: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceRoll {
    pub outcome: DiceSide,
    /// `None` when the previous outcome was repeated.
    pub dice: Option<[u8; 3]>,
}

/// Last outcome per room. Outlives individual rounds so the repeat rule has
/// something to repeat.
#[derive(Default)]
pub struct OutcomeMemory {
    outcomes: Mutex<HashMap<RoomId, DiceSide>>,
}

impl OutcomeMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self, room: RoomId) -> Option<DiceSide> {
        self.outcomes.lock().get(&room).copied()
    }

    pub fn remember(&self, room: RoomId, outcome: DiceSide) {
        self.outcomes.lock().insert(room, outcome);
    }

    pub fn forget(&self, room: RoomId) {
        self.outcomes.lock().remove(&room);
    }
}

/// Repeat `previous` with probability `stickiness`, otherwise roll 3d6.
pub fn roll_outcome<R: Rng + ?Sized>(
    rng: &mut R,
    previous: Option<DiceSide>,
    config: &DiceConfig,
) -> DiceRoll {
    if let Some(previous) = previous {
        if rng.gen_bool(config.stickiness) {
            return DiceRoll {
                outcome: previous,
                dice: None,
            };
        }
    }

    let dice = [
        rng.gen_range(1..=6u8),
        rng.gen_range(1..=6u8),
        rng.gen_range(1..=6u8),
    ];
    let sum: u8 = dice.iter().sum();
    let outcome = if sum >= config.high_threshold {
        DiceSide::High
    } else {
        DiceSide::Low
    };
    DiceRoll {
        outcome,
        dice: Some(dice),
    }
}

/// Pay winners `amount × multiplier` and book net profit or loss on the
/// leaderboard. Stakes were debited when the bets were placed.
pub fn settle_bets(
    ledger: &EconomyLedger,
    bets: &[Bet<DiceSide>],
    outcome: DiceSide,
    multiplier: u64,
) -> Vec<PayoutLine> {
    bets.iter()
        .map(|bet| {
            let (payout, score_delta) = if bet.choice == outcome {
                let payout = bet.amount.saturating_mul(multiplier);
                if let Err(e) = ledger.credit(bet.account, payout) {
                    tracing::error!("Failed to pay {} to {}: {}", payout, bet.account, e);
                }
                (payout, payout as i64 - bet.amount as i64)
            } else {
                (0, -(bet.amount as i64))
            };
            ledger.adjust_score(bet.account, score_delta);

            PayoutLine {
                account: bet.account,
                display_name: bet.display_name.clone(),
                choice: bet.choice,
                staked: bet.amount,
                payout,
                score_delta,
            }
        })
        .collect()
}

struct DiceState {
    phase: RoundPhase,
    deadline: Instant,
    last_activity: Option<Instant>,
    last_tick: Instant,
    bets: Vec<Bet<DiceSide>>,
    rng: StdRng,
}

impl DiceState {
    fn should_close(&self, now: Instant, config: &DiceConfig) -> bool {
        if now >= self.deadline {
            return true;
        }
        match self.last_activity {
            Some(last) if !self.bets.is_empty() => now - last >= config.inactivity_window,
            _ => false,
        }
    }

    fn summaries(&self) -> Vec<BetSummary> {
        self.bets
            .iter()
            .map(|bet| BetSummary {
                account: bet.account,
                display_name: bet.display_name.clone(),
                choice: bet.choice.to_string(),
                amount: bet.amount,
            })
            .collect()
    }
}

pub struct DiceRound {
    id: Uuid,
    room: RoomId,
    ctx: GameContext,
    memory: Arc<OutcomeMemory>,
    state: Mutex<DiceState>,
    supervisor: TaskSupervisor,
}

impl DiceRound {
    pub fn new(room: RoomId, ctx: GameContext, memory: Arc<OutcomeMemory>) -> Self {
        let now = Instant::now();
        let deadline = now + ctx.config.dice.countdown;
        let rng = ctx.session_rng();
        Self {
            id: Uuid::new_v4(),
            room,
            ctx,
            memory,
            state: Mutex::new(DiceState {
                phase: RoundPhase::Open,
                deadline,
                last_activity: None,
                last_tick: now,
                bets: Vec::new(),
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

    pub fn bets(&self) -> Vec<Bet<DiceSide>> {
        self.state.lock().bets.clone()
    }

    /// Debit the stake and record the bet. Rejected bets change nothing.
    pub fn place_bet(
        &self,
        account: AccountId,
        display_name: &str,
        choice: DiceSide,
        amount: u64,
    ) -> Result<BetReceipt> {
        if amount == 0 {
            return Err(GameError::validation("Bet amount must be greater than 0"));
        }

        let mut state = self.state.lock();
        if !state.phase.is_open() {
            return Err(GameError::RoundClosed);
        }

        let balance = self.ctx.ledger.debit(account, amount)?;
        state.bets.push(Bet {
            account,
            display_name: display_name.to_string(),
            choice,
            amount,
        });
        state.last_activity = Some(Instant::now());

        tracing::debug!(
            "Round {} bet: {} on {} for {}",
            self.id,
            account,
            choice,
            amount
        );
        Ok(BetReceipt {
            round_id: self.id,
            balance,
            bets_in_round: state.bets.len(),
        })
    }

    async fn run(self: Arc<Self>, registry: Arc<SessionRegistry<Self>>) {
        let config = self.ctx.config.dice.clone();
        let mut shutdown = self.supervisor.signal();

        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::RoundOpened {
                    kind: GameKind::Dice,
                    round_id: self.id,
                    closes_in_secs: config.countdown.as_secs(),
                },
            )
            .await;

        loop {
            if shutdown.sleep(config.poll_interval).await.is_err() {
                self.cancel().await;
                registry.release(self.room, &self);
                return;
            }

            let now = Instant::now();
            let tick = {
                let mut state = self.state.lock();
                if state.should_close(now, &config) {
                    break;
                }
                if now - state.last_tick >= config.tick_interval {
                    state.last_tick = now;
                    Some(OutboundEvent::RoundTick {
                        kind: GameKind::Dice,
                        round_id: self.id,
                        remaining_secs: state.deadline.saturating_duration_since(now).as_secs(),
                        bets: state.summaries(),
                    })
                } else {
                    None
                }
            };
            if let Some(tick) = tick {
                self.ctx.notifier.send(self.room, tick).await;
            }
        }

        self.resolve().await;
        registry.release(self.room, &self);
    }

    /// Close the round, roll, settle and announce. Returns `None` if the round
    /// was already closed, so a round pays out at most once.
    pub async fn resolve(&self) -> Option<DiceRoll> {
        let config = &self.ctx.config.dice;
        let (bets, roll) = {
            let mut state = self.state.lock();
            state.phase.transition(RoundPhase::Resolved).ok()?;
            let previous = self.memory.previous(self.room);
            let roll = roll_outcome(&mut state.rng, previous, config);
            (std::mem::take(&mut state.bets), roll)
        };
        self.memory.remember(self.room, roll.outcome);

        let breakdown = settle_bets(&self.ctx.ledger, &bets, roll.outcome, config.payout_multiplier);
        tracing::info!(
            "Round {} in room {} resolved {} with {} bets",
            self.id,
            self.room,
            roll.outcome,
            breakdown.len()
        );

        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::RoundResolved {
                    round_id: self.id,
                    outcome: roll.outcome,
                    dice: roll.dice,
                    breakdown,
                },
            )
            .await;
        Some(roll)
    }

    /// Refund every stake and announce the cancellation.
    async fn cancel(&self) {
        let bets = {
            let mut state = self.state.lock();
            if state.phase.transition(RoundPhase::Cancelled).is_err() {
                return;
            }
            std::mem::take(&mut state.bets)
        };

        let mut refunds = Vec::with_capacity(bets.len());
        for bet in bets {
            if let Err(e) = self.ctx.ledger.credit(bet.account, bet.amount) {
                tracing::error!("Failed to refund {} to {}: {}", bet.amount, bet.account, e);
                continue;
            }
            refunds.push((bet.account, bet.amount));
        }

        tracing::warn!("Round {} in room {} cancelled", self.id, self.room);
        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::RoundCancelled {
                    kind: GameKind::Dice,
                    round_id: self.id,
                    refunds,
                },
            )
            .await;
    }
}

impl Session for DiceRound {
    const KIND: GameKind = GameKind::Dice;

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChannelSink, DeliveryError, Envelope, EventSink, Notifier};
    use async_trait::async_trait;
    use parlor_core::GameConfig;
    use rand::SeedableRng;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn context() -> (GameContext, UnboundedReceiver<Envelope>) {
        let (sink, rx) = ChannelSink::new();
        let ctx = GameContext::new(
            Arc::new(EconomyLedger::new()),
            Arc::new(GameConfig::default()),
            Notifier::new(Arc::new(sink)),
        );
        (ctx, rx)
    }

    fn bet(id: i64, choice: DiceSide, amount: u64) -> Bet<DiceSide> {
        Bet {
            account: AccountId(id),
            display_name: format!("p{}", id),
            choice,
            amount,
        }
    }

    async fn next_resolution(rx: &mut UnboundedReceiver<Envelope>) -> OutboundEvent {
        loop {
            let envelope = rx.recv().await.expect("channel open");
            if matches!(envelope.event, OutboundEvent::RoundResolved { .. }) {
                return envelope.event;
            }
        }
    }

    #[test]
    fn test_settle_high_scenario() {
        let ledger = EconomyLedger::new();
        let (a, b, c) = (AccountId(1), AccountId(2), AccountId(3));
        for id in [a, b, c] {
            ledger.credit(id, 1_000_000).unwrap();
        }
        ledger.debit(a, 100_000).unwrap();
        ledger.debit(b, 50_000).unwrap();
        ledger.debit(c, 200_000).unwrap();

        let bets = vec![
            bet(1, DiceSide::High, 100_000),
            bet(2, DiceSide::Low, 50_000),
            bet(3, DiceSide::High, 200_000),
        ];
        let lines = settle_bets(&ledger, &bets, DiceSide::High, 2);

        assert_eq!(ledger.balance(a), 900_000 + 200_000);
        assert_eq!(ledger.balance(b), 950_000);
        assert_eq!(ledger.balance(c), 800_000 + 400_000);
        assert_eq!(ledger.account(a).unwrap().score, 100_000);
        assert_eq!(ledger.account(b).unwrap().score, -50_000);
        assert_eq!(ledger.account(c).unwrap().score, 200_000);
        assert_eq!(lines[1].payout, 0);
        assert_eq!(lines[2].payout, 400_000);
    }

    #[test]
    fn test_roll_threshold_and_repeat() {
        let config = DiceConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let roll = roll_outcome(&mut rng, None, &config);
            let dice = roll.dice.expect("fresh roll");
            let sum: u8 = dice.iter().sum();
            assert!(dice.iter().all(|d| (1..=6).contains(d)));
            assert_eq!(roll.outcome == DiceSide::High, sum >= 11);
        }

        let always_repeat = DiceConfig {
            stickiness: 1.0,
            ..DiceConfig::default()
        };
        let roll = roll_outcome(&mut rng, Some(DiceSide::Low), &always_repeat);
        assert_eq!(roll, DiceRoll { outcome: DiceSide::Low, dice: None });
    }

    #[tokio::test(start_paused = true)]
    async fn test_bets_debit_and_rejections_leave_balance() {
        let (ctx, _rx) = context();
        let alice = AccountId(10);
        ctx.ledger.credit(alice, 1_000).unwrap();

        let round = DiceRound::new(RoomId(1), ctx.clone(), Arc::new(OutcomeMemory::new()));
        round.place_bet(alice, "alice", DiceSide::High, 300).unwrap();
        round.place_bet(alice, "alice", DiceSide::Low, 200).unwrap();

        assert!(round.place_bet(alice, "alice", DiceSide::Low, 501).unwrap_err().is_insufficient_funds());
        assert!(matches!(
            round.place_bet(alice, "alice", DiceSide::Low, 0),
            Err(GameError::Validation(_))
        ));

        assert_eq!(ctx.ledger.balance(alice), 500);
        assert_eq!(round.bets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_round_resolves_after_deadline() {
        let (ctx, mut rx) = context();
        let config = ctx.config.dice.clone();
        let registry = SessionRegistry::<DiceRound>::new();
        let memory = Arc::new(OutcomeMemory::new());
        let started = Instant::now();

        let (round, created) = registry
            .get_or_create(RoomId(2), || Ok(DiceRound::new(RoomId(2), ctx.clone(), memory.clone())))
            .unwrap();
        assert!(created);

        let event = next_resolution(&mut rx).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= config.countdown);
        assert!(elapsed <= config.countdown + config.poll_interval);
        match event {
            OutboundEvent::RoundResolved { breakdown, .. } => assert!(breakdown.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }

        round.supervisor().join().await;
        assert_eq!(round.phase(), RoundPhase::Resolved);
        assert!(registry.get(RoomId(2)).is_none());
        assert!(memory.previous(RoomId(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_closes_early() {
        let (ctx, mut rx) = context();
        let config = ctx.config.dice.clone();
        ctx.ledger.credit(AccountId(1), 10_000).unwrap();
        let registry = SessionRegistry::<DiceRound>::new();
        let started = Instant::now();

        let (round, _) = registry
            .get_or_create(RoomId(3), || {
                Ok(DiceRound::new(RoomId(3), ctx.clone(), Arc::new(OutcomeMemory::new())))
            })
            .unwrap();
        round.place_bet(AccountId(1), "p1", DiceSide::Low, 1_000).unwrap();

        next_resolution(&mut rx).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= config.inactivity_window);
        assert!(elapsed <= config.inactivity_window + config.poll_interval);
        assert!(elapsed < config.countdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_refunds_stakes() {
        let (ctx, mut rx) = context();
        ctx.ledger.credit(AccountId(4), 5_000).unwrap();
        let registry = SessionRegistry::<DiceRound>::new();

        let (round, _) = registry
            .get_or_create(RoomId(4), || {
                Ok(DiceRound::new(RoomId(4), ctx.clone(), Arc::new(OutcomeMemory::new())))
            })
            .unwrap();
        round.place_bet(AccountId(4), "p4", DiceSide::High, 2_000).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(registry.cancel_room(RoomId(4)).await);
        assert_eq!(ctx.ledger.balance(AccountId(4)), 5_000);
        assert_eq!(round.phase(), RoundPhase::Cancelled);

        let mut cancelled = false;
        while let Ok(envelope) = rx.try_recv() {
            if let OutboundEvent::RoundCancelled { refunds, .. } = envelope.event {
                assert_eq!(refunds, vec![(AccountId(4), 2_000)]);
                cancelled = true;
            }
        }
        assert!(cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_happens_once() {
        let (ctx, _rx) = context();
        ctx.ledger.credit(AccountId(5), 100).unwrap();
        let round = DiceRound::new(RoomId(5), ctx.clone(), Arc::new(OutcomeMemory::new()));
        round.place_bet(AccountId(5), "p5", DiceSide::High, 100).unwrap();

        assert!(round.resolve().await.is_some());
        let after_first = ctx.ledger.balance(AccountId(5));
        assert!(round.resolve().await.is_none());
        assert_eq!(ctx.ledger.balance(AccountId(5)), after_first);
        assert!(matches!(
            round.place_bet(AccountId(5), "p5", DiceSide::High, 1),
            Err(GameError::RoundClosed)
        ));
    }

    struct UnreachableSink;

    #[async_trait]
    impl EventSink for UnreachableSink {
        async fn deliver(
            &self,
            _room: RoomId,
            _event: &OutboundEvent,
        ) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError("platform offline".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_settles_when_delivery_fails() {
        let ctx = GameContext::new(
            Arc::new(EconomyLedger::new()),
            Arc::new(GameConfig::default()),
            Notifier::new(Arc::new(UnreachableSink)),
        );
        let config = ctx.config.dice.clone();
        ctx.ledger.credit(AccountId(6), 10_000).unwrap();
        let registry = SessionRegistry::<DiceRound>::new();
        let started = Instant::now();

        let (round, _) = registry
            .get_or_create(RoomId(6), || {
                Ok(DiceRound::new(RoomId(6), ctx.clone(), Arc::new(OutcomeMemory::new())))
            })
            .unwrap();
        round.place_bet(AccountId(6), "p6", DiceSide::High, 1_000).unwrap();

        round.supervisor().join().await;
        assert!(started.elapsed() <= config.inactivity_window + config.poll_interval);
        assert_eq!(round.phase(), RoundPhase::Resolved);
        assert!(registry.get(RoomId(6)).is_none());

        // Win or lose, the stake was settled: balance and score moved together.
        let account = ctx.ledger.account(AccountId(6)).unwrap();
        assert_eq!(account.score.abs(), 1_000);
        assert_eq!(account.balance as i64, 10_000 + account.score);
    }
}
