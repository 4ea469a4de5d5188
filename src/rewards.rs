//! Reward settlement table.
//!
//! A pure mapping from (opponent kind, difficulty, outcome) to a currency
//! amount. The outcome is always from the perspective of the participant
//! being paid.

use crate::model::{BotLevel, MatchOutcome};

/// The kind of opponent a reward is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentClass {
    Bot(BotLevel),
    Player,
}

/// Coins earned for the given outcome. Losses never pay.
pub fn reward(opponent: OpponentClass, outcome: MatchOutcome) -> i64 {
    match (opponent, outcome) {
        (_, MatchOutcome::Lose) => 0,
        (OpponentClass::Bot(BotLevel::Easy), MatchOutcome::Win) => 45,
        (OpponentClass::Bot(BotLevel::Easy), MatchOutcome::Draw) => 10,
        (OpponentClass::Bot(BotLevel::Medium), MatchOutcome::Win) => 75,
        (OpponentClass::Bot(BotLevel::Medium), MatchOutcome::Draw) => 20,
        (OpponentClass::Bot(BotLevel::Hard), MatchOutcome::Win) => 100,
        (OpponentClass::Bot(BotLevel::Hard), MatchOutcome::Draw) => 30,
        (OpponentClass::Player, MatchOutcome::Win) => 50,
        (OpponentClass::Player, MatchOutcome::Draw) => 20,
    }
}
