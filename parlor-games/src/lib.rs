//! parlor games - timed rounds and battle lobbies for chat rooms
//!
//! Every room can run at most one session of each kind at a time: a high/low
//! dice round, a number-draw lottery and a battle-royale lobby. Sessions own a
//! single background task that drives them from open to resolved, settling
//! stakes through the shared [`EconomyLedger`](parlor_core::EconomyLedger) and
//! reporting progress through an [`EventSink`].

pub mod battle;
pub mod context;
pub mod dice;
pub mod engine;
pub mod error;
pub mod events;
pub mod lottery;
pub mod notifier;
pub mod phase;
pub mod registry;
pub mod supervisor;

pub use battle::{BattleLobby, CombatSimulator, Combatant};
pub use dice::{DiceRound, OutcomeMemory};
pub use engine::{GameEngine, Reply};
pub use error::{GameError, Result};
pub use events::{
    DiceSide, GameKind, InboundEvent, LobbyMode, Loadout, MatchEnd, OutboundEvent, RosterEntry,
};
pub use lottery::LotteryRound;
pub use notifier::{ChannelSink, Envelope, EventSink, Notifier};
pub use phase::{BattlePhase, RoundPhase};
pub use registry::{Session, SessionRegistry};
