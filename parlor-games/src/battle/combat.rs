//! Automatic shoot-out that runs during the combat phase.

use super::combatant::Combatant;
use super::BattleLobby;
use crate::events::OutboundEvent;
use crate::supervisor::{Cancelled, ShutdownSignal};
use parlor_core::{AccountId, BattleConfig};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatEvent {
    pub attacker: AccountId,
    pub target: AccountId,
    pub damage: i32,
    pub eliminated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatEnd {
    LastStanding,
    TimeUp,
}

pub struct CombatSimulator {
    config: BattleConfig,
}

impl CombatSimulator {
    pub fn new(config: BattleConfig) -> Self {
        Self { config }
    }

    /// True once no active combatant has an active opponent left.
    pub fn is_settled(roster: &[Combatant]) -> bool {
        !roster
            .iter()
            .filter(|c| c.is_active())
            .any(|a| Self::has_target(roster, a))
    }

    fn has_target(roster: &[Combatant], attacker: &Combatant) -> bool {
        roster.iter().any(|t| t.is_active() && !attacker.is_ally(t))
    }

    /// Fire one shot between two random opponents. `None` when combat is
    /// already settled.
    pub fn step<R: Rng + ?Sized>(&self, roster: &mut [Combatant], rng: &mut R) -> Option<CombatEvent> {
        let shooters: Vec<usize> = (0..roster.len())
            .filter(|&i| roster[i].is_active() && Self::has_target(roster, &roster[i]))
            .collect();
        let &attacker = shooters.choose(rng)?;

        let targets: Vec<usize> = (0..roster.len())
            .filter(|&i| roster[i].is_active() && !roster[attacker].is_ally(&roster[i]))
            .collect();
        let &target = targets.choose(rng)?;

        let damage = rng.gen_range(self.config.damage_min..=self.config.damage_max);
        let eliminated = roster[target].take_damage(damage);
        if eliminated {
            roster[attacker].kills += 1;
        }

        Some(CombatEvent {
            attacker: roster[attacker].account,
            target: roster[target].account,
            damage,
            eliminated,
        })
    }

    pub fn shot_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.config.shot_delay_min..=self.config.shot_delay_max)
    }

    /// Run until one side remains or the budget runs out. The last shot may
    /// land up to one shot delay after the budget.
    pub async fn run(
        &self,
        lobby: &BattleLobby,
        signal: &mut ShutdownSignal,
    ) -> Result<CombatEnd, Cancelled> {
        let deadline = Instant::now() + self.config.combat_budget;

        loop {
            if Instant::now() >= deadline {
                return Ok(CombatEnd::TimeUp);
            }

            let (event, delay) = {
                let mut state = lobby.state.lock();
                let state = &mut *state;
                if Self::is_settled(&state.combatants) {
                    return Ok(CombatEnd::LastStanding);
                }
                let event = self.step(&mut state.combatants, &mut state.rng);
                (event, self.shot_delay(&mut state.rng))
            };

            if let Some(event) = event.filter(|e| e.eliminated) {
                tracing::debug!(
                    "Lobby {}: {} eliminated {} ({} dmg)",
                    lobby.id,
                    event.attacker,
                    event.target,
                    event.damage
                );
                lobby
                    .ctx
                    .notifier
                    .send(
                        lobby.room,
                        OutboundEvent::EliminationEvent {
                            lobby_id: lobby.id,
                            attacker: event.attacker,
                            target: event.target,
                            damage: event.damage,
                        },
                    )
                    .await;
            }

            signal.sleep(delay).await?;
        }
    }
}
