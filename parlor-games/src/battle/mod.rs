//! Battle-royale lobbies.
//!
//! A lobby collects combatants while `Forming`. `start` spawns the single
//! match task, which walks the lobby through matchmaking, the airdrop flight,
//! looting and combat before announcing a winner and releasing the room.

pub mod combat;
pub mod combatant;

pub use combat::{CombatEnd, CombatEvent, CombatSimulator};
pub use combatant::{pick_winner, Combatant, Inventory};

use crate::context::GameContext;
use crate::error::{GameError, Result};
use crate::events::{GameKind, LobbyMode, MatchEnd, OutboundEvent, RosterEntry};
use crate::phase::BattlePhase;
use crate::registry::{Session, SessionRegistry};
use crate::supervisor::{Cancelled, ShutdownSignal, TaskSupervisor};
use combatant::{rank_survivors, smaller_team};
use parking_lot::Mutex;
use parlor_core::{AccountId, BattleConfig, RoomId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Seconds after takeoff at which a time-left reminder goes out.
const FLIGHT_REMINDERS: [u64; 3] = [5, 20, 28];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub remaining: usize,
    pub disbanded: bool,
}

struct LobbyState {
    phase: BattlePhase,
    combatants: Vec<Combatant>,
    map: Option<String>,
    flight_open: bool,
    rng: StdRng,
    next_seq: u64,
}

impl LobbyState {
    fn enroll(
        &mut self,
        mode: LobbyMode,
        battle: &BattleConfig,
        account: AccountId,
        name: &str,
    ) -> Option<u8> {
        let team = match mode {
            LobbyMode::Team => Some(smaller_team(&self.combatants)),
            LobbyMode::Solo => None,
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.combatants.push(Combatant::new(
            account,
            name,
            battle.starting_hp,
            battle.starting_medkits,
            team,
            seq,
        ));
        team
    }
}

pub struct BattleLobby {
    id: Uuid,
    room: RoomId,
    mode: LobbyMode,
    ctx: GameContext,
    state: Mutex<LobbyState>,
    supervisor: TaskSupervisor,
}

impl BattleLobby {
    /// A forming lobby whose roster already holds the player who opened it,
    /// so it is never visible with nobody in it.
    pub fn new(
        room: RoomId,
        mode: LobbyMode,
        ctx: GameContext,
        opener: AccountId,
        opener_name: &str,
    ) -> Self {
        let mut state = LobbyState {
            phase: BattlePhase::Forming,
            combatants: Vec::new(),
            map: None,
            flight_open: false,
            rng: ctx.session_rng(),
            next_seq: 0,
        };
        state.enroll(mode, &ctx.config.battle, opener, opener_name);
        Self {
            id: Uuid::new_v4(),
            room,
            mode,
            ctx,
            state: Mutex::new(state),
            supervisor: TaskSupervisor::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> LobbyMode {
        self.mode
    }

    pub fn phase(&self) -> BattlePhase {
        self.state.lock().phase
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.state
            .lock()
            .combatants
            .iter()
            .map(Combatant::roster_entry)
            .collect()
    }

    pub fn combatants(&self) -> Vec<Combatant> {
        self.state.lock().combatants.clone()
    }

    pub fn update_event(&self) -> OutboundEvent {
        let state = self.state.lock();
        OutboundEvent::LobbyUpdated {
            lobby_id: self.id,
            mode: self.mode,
            phase: state.phase,
            map: state.map.clone(),
            roster: state.combatants.iter().map(Combatant::roster_entry).collect(),
        }
    }

    /// Add a combatant while the lobby is forming. Returns the roster size.
    pub fn join(&self, account: AccountId, display_name: &str) -> Result<usize> {
        let mut state = self.state.lock();
        if state.phase != BattlePhase::Forming {
            return Err(GameError::invalid_state("Lobby is no longer accepting players"));
        }
        if state.combatants.iter().any(|c| c.account == account) {
            return Err(GameError::AlreadyJoined(account));
        }

        let team = state.enroll(self.mode, &self.ctx.config.battle, account, display_name);
        tracing::debug!("Lobby {}: {} joined (team {:?})", self.id, account, team);
        Ok(state.combatants.len())
    }

    /// Remove a combatant while forming; the last one out disbands the lobby.
    pub fn leave(&self, account: AccountId) -> Result<LeaveOutcome> {
        let mut state = self.state.lock();
        if state.phase != BattlePhase::Forming {
            return Err(GameError::invalid_state("Cannot leave a lobby that has started"));
        }
        let index = state
            .combatants
            .iter()
            .position(|c| c.account == account)
            .ok_or(GameError::NotInLobby(account))?;
        state.combatants.remove(index);

        let disbanded = state.combatants.is_empty();
        if disbanded {
            state.phase.transition(BattlePhase::Disbanded)?;
            tracing::info!("Lobby {} in room {} disbanded", self.id, self.room);
        }
        Ok(LeaveOutcome {
            remaining: state.combatants.len(),
            disbanded,
        })
    }

    /// Start the match once. Later calls only report the current phase; the
    /// boolean is true for the call that spawned the match task.
    pub fn start(self: &Arc<Self>, registry: &Arc<SessionRegistry<Self>>) -> Result<(BattlePhase, bool)> {
        let mut state = self.state.lock();
        match state.phase {
            BattlePhase::Forming if state.combatants.is_empty() => {
                Err(GameError::invalid_state("Lobby has no players"))
            }
            BattlePhase::Forming => {
                state.phase.transition(BattlePhase::Matchmaking)?;
                self.supervisor.spawn(self.clone().run_match(registry.clone()));
                tracing::info!(
                    "Lobby {} in room {} started with {} players",
                    self.id,
                    self.room,
                    state.combatants.len()
                );
                Ok((state.phase, true))
            }
            BattlePhase::Disbanded => Err(GameError::invalid_state("Lobby was disbanded")),
            phase => Ok((phase, false)),
        }
    }

    /// Leave the plane early. Returns false if the combatant had already jumped.
    pub fn jump(&self, account: AccountId) -> Result<bool> {
        let mut state = self.state.lock();
        if state.phase != BattlePhase::Airdrop || !state.flight_open {
            return Err(GameError::invalid_state("The plane is not in the air"));
        }
        let combatant = state
            .combatants
            .iter_mut()
            .find(|c| c.account == account)
            .ok_or(GameError::NotInLobby(account))?;
        if combatant.jumped {
            return Ok(false);
        }
        combatant.jumped = true;
        Ok(true)
    }

    fn advance(&self, next: BattlePhase) {
        if let Err(e) = self.state.lock().phase.transition(next) {
            tracing::error!("Lobby {}: {}", self.id, e);
        }
    }

    async fn announce(&self, key: &str, params: &[(&str, String)]) {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::PhaseAnnouncement {
                    lobby_id: self.id,
                    key: key.to_string(),
                    params,
                },
            )
            .await;
    }

    async fn publish_roster(&self) {
        self.ctx.notifier.send(self.room, self.update_event()).await;
    }

    async fn run_match(self: Arc<Self>, registry: Arc<SessionRegistry<Self>>) {
        let mut signal = self.supervisor.signal();
        let reason = match self.play(&mut signal).await {
            Ok(CombatEnd::LastStanding) => MatchEnd::LastStanding,
            Ok(CombatEnd::TimeUp) => MatchEnd::TimeUp,
            Err(Cancelled) => MatchEnd::Cancelled,
        };
        self.finish(reason).await;
        registry.release(self.room, &self);
    }

    async fn play(&self, signal: &mut ShutdownSignal) -> std::result::Result<CombatEnd, Cancelled> {
        let config = self.ctx.config.battle.clone();

        let wait = {
            let mut state = self.state.lock();
            state
                .rng
                .gen_range(config.matchmaking_min..=config.matchmaking_max)
        };
        tracing::debug!("Lobby {}: matchmaking for {:?}", self.id, wait);
        signal.sleep(wait).await?;

        self.advance(BattlePhase::Airdrop);
        self.announce(
            "matchmaking.found",
            &[("spawn_secs", config.spawn_delay.as_secs().to_string())],
        )
        .await;
        signal.sleep(config.spawn_delay).await?;

        self.fly(&config, signal).await?;
        self.loot(&config, signal).await?;

        self.advance(BattlePhase::Combat);
        self.publish_roster().await;
        self.announce(
            "combat.start",
            &[("budget_secs", config.combat_budget.as_secs().to_string())],
        )
        .await;

        CombatSimulator::new(config).run(self, signal).await
    }

    async fn fly(
        &self,
        config: &BattleConfig,
        signal: &mut ShutdownSignal,
    ) -> std::result::Result<(), Cancelled> {
        let map = {
            let mut state = self.state.lock();
            let state = &mut *state;
            state.flight_open = true;
            let map = config
                .maps
                .choose(&mut state.rng)
                .cloned()
                .unwrap_or_default();
            state.map = Some(map.clone());
            map
        };
        self.announce(
            "airdrop.plane",
            &[
                ("map", map),
                ("window_secs", config.flight_window.as_secs().to_string()),
            ],
        )
        .await;

        let takeoff = Instant::now();
        let window_end = takeoff + config.flight_window;
        for offset in FLIGHT_REMINDERS {
            let offset = Duration::from_secs(offset);
            if offset >= config.flight_window {
                continue;
            }
            signal.sleep_until(takeoff + offset).await?;
            let remaining = config.flight_window - offset;
            self.announce(
                "airdrop.remaining",
                &[("secs", remaining.as_secs().to_string())],
            )
            .await;
        }
        signal.sleep_until(window_end).await?;

        let auto_jumped = {
            let mut state = self.state.lock();
            state.flight_open = false;
            let mut count = 0;
            for combatant in state.combatants.iter_mut().filter(|c| !c.jumped) {
                combatant.jumped = true;
                count += 1;
            }
            count
        };
        self.announce("airdrop.landed", &[("auto_jumped", auto_jumped.to_string())])
            .await;
        Ok(())
    }

    async fn loot(
        &self,
        config: &BattleConfig,
        signal: &mut ShutdownSignal,
    ) -> std::result::Result<(), Cancelled> {
        self.advance(BattlePhase::Looting);

        let count = self.state.lock().combatants.len();
        for index in 0..count {
            {
                let mut state = self.state.lock();
                let state = &mut *state;
                let secondary = config.secondary_weapons.choose(&mut state.rng).cloned();
                let primary = if state.rng.gen_bool(config.primary_drop_chance) {
                    config.primary_weapons.choose(&mut state.rng).cloned()
                } else {
                    None
                };
                if let Some(combatant) = state.combatants.get_mut(index) {
                    combatant.inventory.secondary = secondary;
                    combatant.inventory.primary = primary;
                }
            }
            signal.sleep(config.loot_pacing).await?;
        }

        let loadouts = self
            .state
            .lock()
            .combatants
            .iter()
            .map(Combatant::loadout)
            .collect();
        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::LootSummary {
                    lobby_id: self.id,
                    loadouts,
                },
            )
            .await;
        Ok(())
    }

    async fn finish(&self, reason: MatchEnd) {
        let (winner, winning_team, standings) = {
            let mut state = self.state.lock();
            if let Err(e) = state.phase.transition(BattlePhase::Resolved) {
                tracing::error!("Lobby {}: {}", self.id, e);
                return;
            }

            let winner = match reason {
                MatchEnd::Cancelled => None,
                _ => pick_winner(&state.combatants).map(|c| (c.account, c.team)),
            };

            let mut ranked: Vec<&Combatant> = state.combatants.iter().collect();
            ranked.sort_by(|a, b| {
                b.alive
                    .cmp(&a.alive)
                    .then_with(|| match a.alive {
                        true => rank_survivors(a, b),
                        false => a.join_seq.cmp(&b.join_seq),
                    })
            });
            let standings = ranked.into_iter().map(Combatant::roster_entry).collect();

            (
                winner.map(|(account, _)| account),
                winner.and_then(|(_, team)| team),
                standings,
            )
        };

        tracing::info!(
            "Lobby {} in room {} resolved ({:?}), winner {:?}",
            self.id,
            self.room,
            reason,
            winner
        );
        self.ctx
            .notifier
            .send(
                self.room,
                OutboundEvent::MatchResolved {
                    lobby_id: self.id,
                    winner,
                    winning_team,
                    reason,
                    standings,
                },
            )
            .await;
    }
}

impl Session for BattleLobby {
    const KIND: GameKind = GameKind::Battle;

    fn room(&self) -> RoomId {
        self.room
    }

    fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Lobbies wait for `start` before spawning anything.
    fn on_created(self: &Arc<Self>, _registry: &Arc<SessionRegistry<Self>>) {}
}
