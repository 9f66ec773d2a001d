//! Lifecycle enums for rounds and lobbies.
//!
//! Each enum has exactly one transition function; any edge not listed there
//! is rejected, which keeps phases monotonic.

use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle of a dice or lottery round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundPhase {
    Open,
    Resolved,
    Cancelled,
}

impl RoundPhase {
    pub fn is_open(self) -> bool {
        self == RoundPhase::Open
    }

    pub fn transition(&mut self, next: RoundPhase) -> Result<()> {
        match (*self, next) {
            (RoundPhase::Open, RoundPhase::Resolved) | (RoundPhase::Open, RoundPhase::Cancelled) => {
                *self = next;
                Ok(())
            }
            (from, to) => Err(GameError::invalid_state(format!(
                "round cannot move from {:?} to {:?}",
                from, to
            ))),
        }
    }
}

/// Lifecycle of a battle lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BattlePhase {
    Forming,
    Matchmaking,
    Airdrop,
    Looting,
    Combat,
    Resolved,
    /// Roster emptied before the match started.
    Disbanded,
}

impl BattlePhase {
    fn successor(self) -> Option<BattlePhase> {
        match self {
            BattlePhase::Forming => Some(BattlePhase::Matchmaking),
            BattlePhase::Matchmaking => Some(BattlePhase::Airdrop),
            BattlePhase::Airdrop => Some(BattlePhase::Looting),
            BattlePhase::Looting => Some(BattlePhase::Combat),
            BattlePhase::Combat => Some(BattlePhase::Resolved),
            BattlePhase::Resolved | BattlePhase::Disbanded => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BattlePhase::Resolved | BattlePhase::Disbanded)
    }

    /// Advance one step, disband a forming lobby, or end a running match early
    /// (cancellation jumps straight to `Resolved`).
    pub fn transition(&mut self, next: BattlePhase) -> Result<()> {
        let allowed = match next {
            BattlePhase::Disbanded => *self == BattlePhase::Forming,
            BattlePhase::Resolved => !self.is_terminal() && *self != BattlePhase::Forming,
            _ => self.successor() == Some(next),
        };
        if !allowed {
            return Err(GameError::invalid_state(format!(
                "lobby cannot move from {:?} to {:?}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_transitions() {
        let mut phase = RoundPhase::Open;
        phase.transition(RoundPhase::Resolved).unwrap();
        assert!(phase.transition(RoundPhase::Open).is_err());
        assert!(phase.transition(RoundPhase::Cancelled).is_err());
        assert_eq!(phase, RoundPhase::Resolved);
    }

    #[test]
    fn test_battle_phases_are_monotonic() {
        let mut phase = BattlePhase::Forming;
        assert!(phase.transition(BattlePhase::Airdrop).is_err());
        assert!(phase.transition(BattlePhase::Resolved).is_err());

        for next in [
            BattlePhase::Matchmaking,
            BattlePhase::Airdrop,
            BattlePhase::Looting,
            BattlePhase::Combat,
            BattlePhase::Resolved,
        ] {
            let before = phase;
            phase.transition(next).unwrap();
            assert!(phase > before);
        }
        assert!(phase.transition(BattlePhase::Disbanded).is_err());
    }

    #[test]
    fn test_early_resolution_and_disband() {
        let mut running = BattlePhase::Airdrop;
        running.transition(BattlePhase::Resolved).unwrap();

        let mut forming = BattlePhase::Forming;
        forming.transition(BattlePhase::Disbanded).unwrap();
        assert!(forming.transition(BattlePhase::Matchmaking).is_err());
    }
}
