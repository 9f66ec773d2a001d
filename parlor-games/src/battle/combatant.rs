use crate::events::{Loadout, RosterEntry};
use parlor_core::AccountId;
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub medkits: u8,
}

#[derive(Debug, Clone)]
pub struct Combatant {
    pub account: AccountId,
    pub display_name: String,
    pub hp: i32,
    pub inventory: Inventory,
    pub alive: bool,
    /// Downed but not yet eliminated. Nothing in the simulation sets it yet,
    /// but an incapacitated combatant neither shoots nor gets targeted.
    pub incapacitated: bool,
    pub kills: u32,
    pub team: Option<u8>,
    pub jumped: bool,
    pub join_seq: u64,
}

impl Combatant {
    pub fn new(
        account: AccountId,
        display_name: &str,
        hp: i32,
        medkits: u8,
        team: Option<u8>,
        join_seq: u64,
    ) -> Self {
        Self {
            account,
            display_name: display_name.to_string(),
            hp,
            inventory: Inventory {
                medkits,
                ..Inventory::default()
            },
            alive: true,
            incapacitated: false,
            kills: 0,
            team,
            jumped: false,
            join_seq,
        }
    }

    pub fn is_active(&self) -> bool {
        self.alive && !self.incapacitated
    }

    /// Apply damage. Returns true only for the hit that eliminates.
    pub fn take_damage(&mut self, damage: i32) -> bool {
        self.hp -= damage;
        if self.hp <= 0 && self.alive {
            self.alive = false;
            return true;
        }
        false
    }

    /// Same side in team mode; never true in solo mode.
    pub fn is_ally(&self, other: &Combatant) -> bool {
        self.account == other.account || (self.team.is_some() && self.team == other.team)
    }

    pub fn loadout(&self) -> Loadout {
        Loadout {
            account: self.account,
            display_name: self.display_name.clone(),
            primary: self.inventory.primary.clone(),
            secondary: self.inventory.secondary.clone(),
            medkits: self.inventory.medkits,
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            account: self.account,
            display_name: self.display_name.clone(),
            team: self.team,
            hp: self.hp,
            alive: self.alive,
            jumped: self.jumped,
            kills: self.kills,
        }
    }
}

/// Team with fewer members; ties go to team 0.
pub fn smaller_team(roster: &[Combatant]) -> u8 {
    let count = |team| roster.iter().filter(|c| c.team == Some(team)).count();
    if count(0) <= count(1) {
        0
    } else {
        1
    }
}

/// Survivor ranking: most kills, then most hit points, then earliest joiner.
pub fn rank_survivors(a: &Combatant, b: &Combatant) -> Ordering {
    b.kills
        .cmp(&a.kills)
        .then(b.hp.cmp(&a.hp))
        .then(a.join_seq.cmp(&b.join_seq))
}

/// The best-ranked living combatant, if any.
pub fn pick_winner(roster: &[Combatant]) -> Option<&Combatant> {
    roster
        .iter()
        .filter(|c| c.alive)
        .min_by(|a, b| rank_survivors(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fighter(id: i64, hp: i32, kills: u32) -> Combatant {
        let mut c = Combatant::new(AccountId(id), &format!("p{}", id), hp, 2, None, id as u64);
        c.kills = kills;
        c
    }

    #[test]
    fn test_elimination_is_permanent() {
        let mut c = fighter(1, 30, 0);
        assert!(!c.take_damage(20));
        assert!(c.take_damage(20));
        assert!(!c.take_damage(20));
        assert!(!c.alive);
        assert!(c.hp < 0);
    }

    #[test]
    fn test_winner_tie_break() {
        let roster = vec![fighter(1, 100, 1), fighter(2, 150, 1), fighter(3, 200, 0)];
        assert_eq!(pick_winner(&roster).unwrap().account, AccountId(2));

        let even = vec![fighter(4, 80, 2), fighter(5, 80, 2)];
        assert_eq!(pick_winner(&even).unwrap().account, AccountId(4));

        let mut dead = fighter(6, 0, 9);
        dead.alive = false;
        assert!(pick_winner(&[dead]).is_none());
    }

    #[test]
    fn test_incapacitated_is_not_active() {
        let mut c = fighter(1, 50, 0);
        c.incapacitated = true;
        assert!(c.alive);
        assert!(!c.is_active());
    }
}
