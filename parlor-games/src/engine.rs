use crate::battle::{BattleLobby, LeaveOutcome};
use crate::context::GameContext;
use crate::dice::{BetReceipt, DiceRound, OutcomeMemory};
use crate::error::{GameError, Result};
use crate::events::{DiceSide, GameKind, InboundEvent, LobbyMode};
use crate::lottery::{EntryReceipt, LotteryRound};
use crate::notifier::{EventSink, Notifier};
use crate::phase::BattlePhase;
use crate::registry::SessionRegistry;
use parlor_core::{
    AccountId, EconomyLedger, GameConfig, LeaderboardEntry, LedgerSnapshot, ParlorError, RoomId,
};
use std::sync::Arc;
use uuid::Uuid;

/// Direct answer to an inbound action. Everything else a player sees arrives
/// through the event sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    BetPlaced(BetReceipt),
    LotteryOpened { round_id: Uuid, created: bool },
    LotteryJoined(EntryReceipt),
    /// `mode` is the lobby's own, which differs from the request when an
    /// existing lobby was joined.
    LobbyOpened {
        lobby_id: Uuid,
        mode: LobbyMode,
        created: bool,
        players: usize,
    },
    LobbyJoined { players: usize },
    LobbyLeft(LeaveOutcome),
    LobbyStarted { phase: BattlePhase, started: bool },
    Jumped { first: bool },
    /// The action targets a game that is not running in this room.
    NotRunning(GameKind),
}

/// Process-wide state: the ledger, one registry per game kind and the
/// outbound notifier.
pub struct GameEngine {
    ctx: GameContext,
    dice: Arc<SessionRegistry<DiceRound>>,
    lotteries: Arc<SessionRegistry<LotteryRound>>,
    lobbies: Arc<SessionRegistry<BattleLobby>>,
    dice_memory: Arc<OutcomeMemory>,
}

impl GameEngine {
    pub fn new(ledger: Arc<EconomyLedger>, config: Arc<GameConfig>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            ctx: GameContext::new(ledger, config, Notifier::new(sink)),
            dice: SessionRegistry::new(),
            lotteries: SessionRegistry::new(),
            lobbies: SessionRegistry::new(),
            dice_memory: Arc::new(OutcomeMemory::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<EconomyLedger> {
        &self.ctx.ledger
    }

    pub fn config(&self) -> &GameConfig {
        &self.ctx.config
    }

    pub async fn handle(&self, room: RoomId, event: InboundEvent) -> Result<Reply> {
        let (account, name) = event.account();
        self.ctx.ledger.ensure_account(account, name);

        let result = match event {
            InboundEvent::PlaceBet {
                account,
                name,
                choice,
                amount,
            } => self.place_bet(room, account, &name, choice, amount),
            InboundEvent::OpenLottery { .. } => self.open_lottery(room),
            InboundEvent::JoinLottery {
                account,
                name,
                numbers,
                wager,
            } => self
                .lotteries
                .get(room)
                .ok_or(GameError::NotFound(GameKind::Lottery))
                .and_then(|round| round.join(account, &name, numbers, wager))
                .map(Reply::LotteryJoined),
            InboundEvent::OpenLobby { account, name, mode } => {
                self.open_lobby(room, account, &name, mode).await
            }
            InboundEvent::JoinLobby { account, name } => self.join_lobby(room, account, &name).await,
            InboundEvent::LeaveLobby { account, .. } => self.leave_lobby(room, account).await,
            InboundEvent::StartLobby { .. } => self.start_lobby(room).await,
            InboundEvent::JumpEarly { account, .. } => self
                .lobby(room)
                .and_then(|lobby| lobby.jump(account))
                .map(|first| Reply::Jumped { first }),
        };

        match result {
            Err(GameError::NotFound(kind)) => Ok(Reply::NotRunning(kind)),
            other => other,
        }
    }

    fn place_bet(
        &self,
        room: RoomId,
        account: AccountId,
        name: &str,
        choice: DiceSide,
        amount: u64,
    ) -> Result<Reply> {
        if amount == 0 {
            return Err(GameError::validation("Bet amount must be greater than 0"));
        }
        // A bet that cannot be covered must not open a round.
        let available = self.ctx.ledger.balance(account);
        if available < amount {
            return Err(ParlorError::InsufficientFunds {
                need: amount,
                available,
            }
            .into());
        }

        let (round, _) = self.dice.get_or_create(room, || {
            Ok(DiceRound::new(room, self.ctx.clone(), self.dice_memory.clone()))
        })?;
        round
            .place_bet(account, name, choice, amount)
            .map(Reply::BetPlaced)
    }

    fn open_lottery(&self, room: RoomId) -> Result<Reply> {
        let (round, created) = self
            .lotteries
            .get_or_create(room, || Ok(LotteryRound::new(room, self.ctx.clone())))?;
        Ok(Reply::LotteryOpened {
            round_id: round.id(),
            created,
        })
    }

    fn lobby(&self, room: RoomId) -> Result<Arc<BattleLobby>> {
        self.lobbies
            .get(room)
            .ok_or(GameError::NotFound(GameKind::Battle))
    }

    async fn open_lobby(
        &self,
        room: RoomId,
        account: AccountId,
        name: &str,
        mode: LobbyMode,
    ) -> Result<Reply> {
        let (lobby, created) = self.lobbies.get_or_create(room, || {
            Ok(BattleLobby::new(room, mode, self.ctx.clone(), account, name))
        })?;
        let players = if created {
            lobby.roster().len()
        } else {
            match lobby.join(account, name) {
                Ok(players) => players,
                Err(GameError::AlreadyJoined(_)) => lobby.roster().len(),
                Err(e) => return Err(e),
            }
        };
        self.publish_lobby(room, &lobby).await;
        Ok(Reply::LobbyOpened {
            lobby_id: lobby.id(),
            mode: lobby.mode(),
            created,
            players,
        })
    }

    async fn join_lobby(&self, room: RoomId, account: AccountId, name: &str) -> Result<Reply> {
        let lobby = self.lobby(room)?;
        let players = lobby.join(account, name)?;
        self.publish_lobby(room, &lobby).await;
        Ok(Reply::LobbyJoined { players })
    }

    async fn leave_lobby(&self, room: RoomId, account: AccountId) -> Result<Reply> {
        let lobby = self.lobby(room)?;
        let outcome = lobby.leave(account)?;
        if outcome.disbanded {
            self.lobbies.release(room, &lobby);
        }
        self.publish_lobby(room, &lobby).await;
        Ok(Reply::LobbyLeft(outcome))
    }

    async fn start_lobby(&self, room: RoomId) -> Result<Reply> {
        let lobby = self.lobby(room)?;
        let (phase, started) = lobby.start(&self.lobbies)?;
        if started {
            self.publish_lobby(room, &lobby).await;
        }
        Ok(Reply::LobbyStarted { phase, started })
    }

    async fn publish_lobby(&self, room: RoomId, lobby: &BattleLobby) {
        self.ctx.notifier.send(room, lobby.update_event()).await;
    }

    /// Grant the starting balance to a new account.
    pub fn register(&self, account: AccountId, name: &str) -> (u64, bool) {
        let grant = self.ctx.config.economy.registration_grant;
        self.ctx.ledger.register(account, name, grant)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.ctx.ledger.leaderboard(limit)
    }

    pub fn active_rooms(&self, kind: GameKind) -> Vec<RoomId> {
        match kind {
            GameKind::Dice => self.dice.active_rooms(),
            GameKind::Lottery => self.lotteries.active_rooms(),
            GameKind::Battle => self.lobbies.active_rooms(),
        }
    }

    /// Cancel every session in `room` and drop what the room remembers.
    /// Returns how many sessions were running.
    pub async fn close_room(&self, room: RoomId) -> usize {
        let (dice, lottery, battle) = futures::join!(
            self.dice.cancel_room(room),
            self.lotteries.cancel_room(room),
            self.lobbies.cancel_room(room),
        );
        self.dice_memory.forget(room);
        [dice, lottery, battle].iter().filter(|c| **c).count()
    }

    pub fn export_state(&self) -> LedgerSnapshot {
        self.ctx.ledger.snapshot()
    }

    pub fn import_state(&self, snapshot: &LedgerSnapshot) {
        self.ctx.ledger.restore(snapshot);
    }

    /// Cancel every running session, refunding open stakes, and return the
    /// final ledger state.
    pub async fn shutdown(&self) -> LedgerSnapshot {
        futures::join!(
            self.dice.shutdown(),
            self.lotteries.shutdown(),
            self.lobbies.shutdown(),
        );
        tracing::info!("Game engine stopped");
        self.export_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OutboundEvent;
    use crate::notifier::{ChannelSink, Envelope};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn engine() -> (Arc<GameEngine>, UnboundedReceiver<Envelope>) {
        let (sink, rx) = ChannelSink::new();
        let engine = GameEngine::new(
            Arc::new(EconomyLedger::new()),
            Arc::new(GameConfig::default()),
            Arc::new(sink),
        );
        (Arc::new(engine), rx)
    }

    fn bet(id: i64, choice: DiceSide, amount: u64) -> InboundEvent {
        InboundEvent::PlaceBet {
            account: AccountId(id),
            name: format!("p{}", id),
            choice,
            amount,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_bets_share_one_round() {
        let (engine, _rx) = engine();
        let room = RoomId(-42);
        for id in 0..8 {
            engine.register(AccountId(id), "p");
        }

        let handles: Vec<_> = (0..8)
            .map(|id| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.handle(room, bet(id, DiceSide::High, 1_000)).await })
            })
            .collect();

        let mut round_ids = Vec::new();
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Reply::BetPlaced(receipt) => round_ids.push(receipt.round_id),
                other => panic!("unexpected reply {:?}", other),
            }
        }
        round_ids.dedup();
        assert_eq!(round_ids.len(), 1);
        assert_eq!(engine.active_rooms(GameKind::Dice), vec![room]);

        let snapshot = engine.shutdown().await;
        assert!(snapshot.balances.values().all(|b| *b == 100_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_bet_opens_nothing() {
        let (engine, _rx) = engine();
        let err = engine
            .handle(RoomId(1), bet(5, DiceSide::Low, 10))
            .await
            .unwrap_err();
        assert!(err.is_insufficient_funds());
        assert!(matches!(
            engine.handle(RoomId(1), bet(5, DiceSide::Low, 0)).await,
            Err(GameError::Validation(_))
        ));
        assert!(engine.active_rooms(GameKind::Dice).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_conservation() {
        let (engine, mut rx) = engine();
        let room = RoomId(7);
        for id in 1..=3 {
            engine.register(AccountId(id), "p");
        }
        let initial: u64 = engine.export_state().balances.values().sum();

        let stakes = [(1, DiceSide::High, 10_000), (2, DiceSide::Low, 20_000), (3, DiceSide::High, 5_000)];
        for (id, choice, amount) in stakes {
            engine.handle(room, bet(id, choice, amount)).await.unwrap();
        }

        let breakdown = loop {
            if let OutboundEvent::RoundResolved { breakdown, .. } = rx.recv().await.unwrap().event {
                break breakdown;
            }
        };
        let staked: u64 = breakdown.iter().map(|l| l.staked).sum();
        let paid: u64 = breakdown.iter().map(|l| l.payout).sum();
        assert_eq!(staked, 35_000);

        let total: u64 = engine.export_state().balances.values().sum();
        assert_eq!(total, initial - staked + paid);
        for line in &breakdown {
            let score = engine.ledger().account(line.account).unwrap().score;
            assert_eq!(score, line.score_delta);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_room_forgets_last_outcome() {
        let (engine, mut rx) = engine();
        let room = RoomId(8);
        engine.register(AccountId(1), "a");
        engine.handle(room, bet(1, DiceSide::Low, 1_000)).await.unwrap();

        let outcome = loop {
            if let OutboundEvent::RoundResolved { outcome, .. } = rx.recv().await.unwrap().event {
                break outcome;
            }
        };
        assert_eq!(engine.dice_memory.previous(room), Some(outcome));

        engine.close_room(room).await;
        assert_eq!(engine.dice_memory.previous(room), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lottery_requires_open_round() {
        let (engine, _rx) = engine();
        let join = InboundEvent::JoinLottery {
            account: AccountId(1),
            name: "a".to_string(),
            numbers: vec![3, 9],
            wager: 0,
        };
        assert_eq!(
            engine.handle(RoomId(2), join.clone()).await.unwrap(),
            Reply::NotRunning(GameKind::Lottery)
        );

        let open = InboundEvent::OpenLottery {
            account: AccountId(1),
            name: "a".to_string(),
        };
        assert!(matches!(
            engine.handle(RoomId(2), open.clone()).await.unwrap(),
            Reply::LotteryOpened { created: true, .. }
        ));
        assert!(matches!(
            engine.handle(RoomId(2), open).await.unwrap(),
            Reply::LotteryOpened { created: false, .. }
        ));
        assert!(matches!(
            engine.handle(RoomId(2), join).await.unwrap(),
            Reply::LotteryJoined(_)
        ));
        assert_eq!(engine.close_room(RoomId(2)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lobby_flow() {
        let (engine, mut rx) = engine();
        let room = RoomId(3);
        let player = |id: i64| (AccountId(id), format!("P{}", id));

        let (account, name) = player(1);
        let reply = engine
            .handle(room, InboundEvent::OpenLobby { account, name, mode: LobbyMode::Team })
            .await
            .unwrap();
        assert!(matches!(reply, Reply::LobbyOpened { created: true, players: 1, .. }));

        // A second open joins the forming lobby and keeps its mode.
        let (account, name) = player(2);
        let reply = engine
            .handle(room, InboundEvent::OpenLobby { account, name, mode: LobbyMode::Solo })
            .await
            .unwrap();
        assert!(matches!(
            reply,
            Reply::LobbyOpened { created: false, mode: LobbyMode::Team, players: 2, .. }
        ));

        for id in 3..=4 {
            let (account, name) = player(id);
            engine
                .handle(room, InboundEvent::JoinLobby { account, name })
                .await
                .unwrap();
        }

        let start = || InboundEvent::StartLobby {
            account: AccountId(1),
            name: "P1".to_string(),
        };
        assert_eq!(
            engine.handle(room, start()).await.unwrap(),
            Reply::LobbyStarted { phase: BattlePhase::Matchmaking, started: true }
        );
        assert_eq!(
            engine.handle(room, start()).await.unwrap(),
            Reply::LobbyStarted { phase: BattlePhase::Matchmaking, started: false }
        );

        let mut last_roster = None;
        while let Ok(envelope) = rx.try_recv() {
            if let OutboundEvent::LobbyUpdated { roster, .. } = envelope.event {
                last_roster = Some(roster);
            }
        }
        let teams: Vec<_> = last_roster.unwrap().iter().map(|r| r.team).collect();
        assert_eq!(teams, vec![Some(0), Some(1), Some(0), Some(1)]);

        assert_eq!(engine.close_room(room).await, 1);
        assert!(engine.active_rooms(GameKind::Battle).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_last_player_frees_room() {
        let (engine, _rx) = engine();
        let room = RoomId(4);
        engine
            .handle(
                room,
                InboundEvent::OpenLobby {
                    account: AccountId(1),
                    name: "a".to_string(),
                    mode: LobbyMode::Solo,
                },
            )
            .await
            .unwrap();
        let reply = engine
            .handle(
                room,
                InboundEvent::LeaveLobby {
                    account: AccountId(1),
                    name: "a".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(reply, Reply::LobbyLeft(LeaveOutcome { remaining: 0, disbanded: true }));
        assert!(engine.active_rooms(GameKind::Battle).is_empty());
        assert_eq!(
            engine
                .handle(room, InboundEvent::JoinLobby { account: AccountId(2), name: "b".to_string() })
                .await
                .unwrap(),
            Reply::NotRunning(GameKind::Battle)
        );
    }

    #[test]
    fn test_register_grants_once() {
        let (engine, _rx) = engine();
        assert_eq!(engine.register(AccountId(1), "a"), (100_000, true));
        engine.ledger().debit(AccountId(1), 1).unwrap();
        assert_eq!(engine.register(AccountId(1), "a"), (99_999, false));
    }
}
