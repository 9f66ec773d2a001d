use crate::error::{ParlorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub dice: DiceConfig,
    pub lottery: LotteryConfig,
    pub battle: BattleConfig,
    pub economy: EconomyConfig,
    /// Fixed RNG seed; `None` seeds every session from entropy.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    pub countdown: Duration,
    pub inactivity_window: Duration,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    /// Chance of repeating the room's previous outcome instead of rolling.
    pub stickiness: f64,
    pub high_threshold: u8,
    pub payout_multiplier: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    pub window: Duration,
    pub tick_interval: Duration,
    pub min_number: u8,
    pub max_number: u8,
    pub max_picks: usize,
    pub min_draws: usize,
    pub max_draws: usize,
    pub match_multiplier: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub matchmaking_min: Duration,
    pub matchmaking_max: Duration,
    pub spawn_delay: Duration,
    pub flight_window: Duration,
    pub loot_pacing: Duration,
    pub combat_budget: Duration,
    pub shot_delay_min: Duration,
    pub shot_delay_max: Duration,
    pub starting_hp: i32,
    pub starting_medkits: u8,
    pub damage_min: i32,
    pub damage_max: i32,
    pub primary_drop_chance: f64,
    pub maps: Vec<String>,
    pub primary_weapons: Vec<String>,
    pub secondary_weapons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub registration_grant: u64,
    pub save_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            dice: DiceConfig::default(),
            lottery: LotteryConfig::default(),
            battle: BattleConfig::default(),
            economy: EconomyConfig::default(),
            seed: None,
        }
    }
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(10),
            inactivity_window: Duration::from_secs(5),
            poll_interval: Duration::from_millis(600),
            tick_interval: Duration::from_secs(5),
            stickiness: 0.6,
            high_threshold: 11,
            payout_multiplier: 2,
        }
    }
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            tick_interval: Duration::from_secs(5),
            min_number: 1,
            max_number: 20,
            max_picks: 5,
            min_draws: 1,
            max_draws: 10,
            match_multiplier: 3,
        }
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            matchmaking_min: Duration::from_secs(1),
            matchmaking_max: Duration::from_secs(50),
            spawn_delay: Duration::from_secs(5),
            flight_window: Duration::from_secs(30),
            loot_pacing: Duration::from_millis(50),
            combat_budget: Duration::from_secs(75),
            shot_delay_min: Duration::from_millis(500),
            shot_delay_max: Duration::from_millis(1200),
            starting_hp: 200,
            starting_medkits: 2,
            damage_min: 15,
            damage_max: 60,
            primary_drop_chance: 0.85,
            maps: to_strings(&[
                "Pine Village",
                "Clock Tower",
                "Sky Gate",
                "Apartment Block",
                "Military Island",
            ]),
            primary_weapons: to_strings(&["ak47", "scar", "m14", "mp5", "mp40"]),
            secondary_weapons: to_strings(&["m500", "g18"]),
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            registration_grant: 100_000,
            save_interval: Duration::from_secs(30),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl GameConfig {
    /// Load from a JSON file; missing fields fall back to defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dice = &self.dice;
        if dice.poll_interval.is_zero() {
            return Err(ParlorError::config("Dice poll interval must be greater than 0"));
        }
        if dice.tick_interval.is_zero() || self.lottery.tick_interval.is_zero() {
            return Err(ParlorError::config("Tick intervals must be greater than 0"));
        }
        if self.economy.save_interval.is_zero() {
            return Err(ParlorError::config("Save interval must be greater than 0"));
        }
        if dice.countdown.is_zero() {
            return Err(ParlorError::config("Dice countdown must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&dice.stickiness) {
            return Err(ParlorError::config("Dice stickiness must be within 0..=1"));
        }
        if !(3..=18).contains(&dice.high_threshold) {
            return Err(ParlorError::config("Dice high threshold must be within 3..=18"));
        }

        let lottery = &self.lottery;
        if lottery.min_number == 0 || lottery.min_number > lottery.max_number {
            return Err(ParlorError::config("Lottery number range is empty"));
        }
        let range_len = (lottery.max_number - lottery.min_number) as usize + 1;
        if lottery.max_picks == 0 || lottery.max_picks > range_len {
            return Err(ParlorError::config(
                "Lottery max picks must be between 1 and the size of the number range",
            ));
        }
        if lottery.min_draws == 0 || lottery.min_draws > lottery.max_draws {
            return Err(ParlorError::config("Lottery draw length range is empty"));
        }

        let battle = &self.battle;
        if battle.matchmaking_min > battle.matchmaking_max {
            return Err(ParlorError::config("Matchmaking range is empty"));
        }
        if battle.shot_delay_min > battle.shot_delay_max {
            return Err(ParlorError::config("Shot delay range is empty"));
        }
        if battle.damage_min <= 0 || battle.damage_min > battle.damage_max {
            return Err(ParlorError::config("Damage range must be positive and non-empty"));
        }
        if battle.starting_hp <= 0 {
            return Err(ParlorError::config("Starting hit points must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&battle.primary_drop_chance) {
            return Err(ParlorError::config("Primary drop chance must be within 0..=1"));
        }
        if battle.maps.is_empty() || battle.secondary_weapons.is_empty() {
            return Err(ParlorError::config("Map and secondary weapon catalogs cannot be empty"));
        }
        if battle.primary_weapons.is_empty() && battle.primary_drop_chance > 0.0 {
            return Err(ParlorError::config("Primary weapon catalog cannot be empty"));
        }

        Ok(())
    }
}
