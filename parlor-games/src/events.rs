use crate::phase::BattlePhase;
use parlor_core::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameKind {
    Dice,
    Lottery,
    Battle,
}

/// Side of a dice wager; also the outcome of a resolved round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceSide {
    High,
    Low,
}

impl fmt::Display for DiceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceSide::High => write!(f, "high"),
            DiceSide::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyMode {
    Solo,
    Team,
}

/// Player actions, decoded once by the platform integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    PlaceBet {
        account: AccountId,
        name: String,
        choice: DiceSide,
        amount: u64,
    },
    OpenLottery {
        account: AccountId,
        name: String,
    },
    JoinLottery {
        account: AccountId,
        name: String,
        numbers: Vec<u8>,
        wager: u64,
    },
    OpenLobby {
        account: AccountId,
        name: String,
        mode: LobbyMode,
    },
    JoinLobby {
        account: AccountId,
        name: String,
    },
    LeaveLobby {
        account: AccountId,
        name: String,
    },
    StartLobby {
        account: AccountId,
        name: String,
    },
    JumpEarly {
        account: AccountId,
        name: String,
    },
}

impl InboundEvent {
    pub fn account(&self) -> (AccountId, &str) {
        match self {
            InboundEvent::PlaceBet { account, name, .. }
            | InboundEvent::OpenLottery { account, name }
            | InboundEvent::JoinLottery { account, name, .. }
            | InboundEvent::OpenLobby { account, name, .. }
            | InboundEvent::JoinLobby { account, name }
            | InboundEvent::LeaveLobby { account, name }
            | InboundEvent::StartLobby { account, name }
            | InboundEvent::JumpEarly { account, name } => (*account, name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSummary {
    pub account: AccountId,
    pub display_name: String,
    pub choice: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLine {
    pub account: AccountId,
    pub display_name: String,
    pub choice: DiceSide,
    pub staked: u64,
    /// Amount credited back; zero for a losing bet.
    pub payout: u64,
    pub score_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryMatch {
    pub account: AccountId,
    pub display_name: String,
    pub picks: Vec<u8>,
    /// One entry per drawn occurrence of a picked number.
    pub matches: Vec<u8>,
    pub wager: u64,
    pub payout: u64,
    pub score_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub account: AccountId,
    pub display_name: String,
    pub team: Option<u8>,
    pub hp: i32,
    pub alive: bool,
    pub jumped: bool,
    pub kills: u32,
}

/// One combatant's kit after looting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub account: AccountId,
    pub display_name: String,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub medkits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEnd {
    LastStanding,
    TimeUp,
    Cancelled,
}

/// Notices produced by sessions, delivered best-effort by an [`EventSink`].
///
/// [`EventSink`]: crate::notifier::EventSink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    RoundOpened {
        kind: GameKind,
        round_id: Uuid,
        closes_in_secs: u64,
    },
    RoundTick {
        kind: GameKind,
        round_id: Uuid,
        remaining_secs: u64,
        bets: Vec<BetSummary>,
    },
    RoundResolved {
        round_id: Uuid,
        outcome: DiceSide,
        /// `None` when the previous outcome was repeated instead of rolled.
        dice: Option<[u8; 3]>,
        breakdown: Vec<PayoutLine>,
    },
    RoundCancelled {
        kind: GameKind,
        round_id: Uuid,
        refunds: Vec<(AccountId, u64)>,
    },
    LotteryDrawn {
        round_id: Uuid,
        results: Vec<u8>,
        matches: Vec<LotteryMatch>,
    },
    LobbyUpdated {
        lobby_id: Uuid,
        mode: LobbyMode,
        phase: BattlePhase,
        /// Chosen when the plane takes off.
        map: Option<String>,
        roster: Vec<RosterEntry>,
    },
    PhaseAnnouncement {
        lobby_id: Uuid,
        key: String,
        params: BTreeMap<String, String>,
    },
    /// Every combatant's kit, in join order.
    LootSummary {
        lobby_id: Uuid,
        loadouts: Vec<Loadout>,
    },
    EliminationEvent {
        lobby_id: Uuid,
        attacker: AccountId,
        target: AccountId,
        damage: i32,
    },
    MatchResolved {
        lobby_id: Uuid,
        winner: Option<AccountId>,
        winning_team: Option<u8>,
        reason: MatchEnd,
        standings: Vec<RosterEntry>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_decoding() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"type":"place_bet","account":7,"name":"hoa","choice":"high","amount":5000}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            InboundEvent::PlaceBet {
                account: AccountId(7),
                name: "hoa".to_string(),
                choice: DiceSide::High,
                amount: 5000,
            }
        );
        assert_eq!(event.account(), (AccountId(7), "hoa"));
    }

    #[test]
    fn test_unknown_inbound_kind_rejected() {
        let result: std::result::Result<InboundEvent, _> =
            serde_json::from_str(r#"{"type":"roll_dice","account":1,"name":"x"}"#);
        assert!(result.is_err());
    }
}
