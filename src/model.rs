//! Core match and invite records.
//!
//! A `MatchRecord` is the persisted shape of one game. It is only ever
//! mutated through the owning `MatchSession`'s serialized handlers; the
//! store is the system of record the session writes through on every
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = u64;
pub type MatchId = Uuid;
pub type InviteId = Uuid;

/// Standard chess starting position.
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One of the two board colors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<chess::Color> for Side {
    fn from(color: chess::Color) -> Self {
        match color {
            chess::Color::White => Side::White,
            chess::Color::Black => Side::Black,
        }
    }
}

impl From<Side> for chess::Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => chess::Color::White,
            Side::Black => chess::Color::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

/// Scripted opponent difficulty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BotLevel {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for BotLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotLevel::Easy => write!(f, "easy"),
            BotLevel::Medium => write!(f, "medium"),
            BotLevel::Hard => write!(f, "hard"),
        }
    }
}

/// Match lifecycle status. `Finished` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    InProgress,
    Finished,
    Abandoned,
}

/// Outcome relative to the match host (the initiating participant).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    Win,
    Lose,
    Draw,
}

/// Why a finished match ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Checkmate,
    Timeout,
    Resign,
    Draw,
}

/// The host's opponent: a scripted bot at a difficulty, or another player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OpponentRef {
    Bot { level: BotLevel },
    User { id: UserId },
}

/// Who is submitting an action against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(UserId),
    Bot,
}

/// One game instance. Never deleted, only marked terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    /// Initiating participant; `result` is recorded relative to them.
    pub host: UserId,
    pub opponent: OpponentRef,
    /// The human playing white. The bot side, when present, is always black,
    /// so the color-to-identity mapping is fixed for the whole match.
    pub white_user: UserId,
    pub status: MatchStatus,
    pub result: Option<MatchOutcome>,
    pub ended_reason: Option<EndReason>,
    pub fen: String,
    /// Accepted moves in standard algebraic notation.
    pub move_history: Vec<String>,
    /// Last accepted move in coordinate form, e.g. `e2e4` or `e7e8q`.
    pub last_move: Option<String>,
    pub current_turn: Side,
    pub white_time: i64,
    pub black_time: i64,
    pub last_move_at: Option<DateTime<Utc>>,
    pub winner: Option<UserId>,
    pub loser: Option<UserId>,
    pub coins_earned: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// Start a match against a scripted opponent. The host plays white.
    pub fn new_bot(host: UserId, level: BotLevel, initial_clock_secs: i64) -> Self {
        Self::new(host, OpponentRef::Bot { level }, host, initial_clock_secs)
    }

    /// Start a player-versus-player match with the given color assignment.
    pub fn new_pvp(
        host: UserId,
        opponent: UserId,
        white_user: UserId,
        initial_clock_secs: i64,
    ) -> Self {
        Self::new(
            host,
            OpponentRef::User { id: opponent },
            white_user,
            initial_clock_secs,
        )
    }

    fn new(host: UserId, opponent: OpponentRef, white_user: UserId, initial_clock_secs: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
            opponent,
            white_user,
            status: MatchStatus::InProgress,
            result: None,
            ended_reason: None,
            fen: INITIAL_FEN.to_string(),
            move_history: Vec::new(),
            last_move: None,
            current_turn: Side::White,
            white_time: initial_clock_secs,
            black_time: initial_clock_secs,
            last_move_at: None,
            winner: None,
            loser: None,
            coins_earned: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_bot_match(&self) -> bool {
        matches!(self.opponent, OpponentRef::Bot { .. })
    }

    pub fn bot_level(&self) -> Option<BotLevel> {
        match self.opponent {
            OpponentRef::Bot { level } => Some(level),
            OpponentRef::User { .. } => None,
        }
    }

    /// The side driven by the oracle, when this is a bot match.
    pub fn bot_side(&self) -> Option<Side> {
        if self.is_bot_match() {
            Some(Side::Black)
        } else {
            None
        }
    }

    /// The human playing black, if any.
    pub fn black_user(&self) -> Option<UserId> {
        match self.opponent {
            OpponentRef::Bot { .. } => None,
            OpponentRef::User { id } => {
                if self.white_user == self.host {
                    Some(id)
                } else {
                    Some(self.host)
                }
            }
        }
    }

    /// The human occupying the given side, if any.
    pub fn user_for(&self, side: Side) -> Option<UserId> {
        match side {
            Side::White => Some(self.white_user),
            Side::Black => self.black_user(),
        }
    }

    /// Which side an actor plays, or `None` for a non-participant.
    pub fn side_of(&self, actor: Actor) -> Option<Side> {
        match actor {
            Actor::Bot => self.bot_side(),
            Actor::User(id) => {
                if self.white_user == id {
                    Some(Side::White)
                } else if self.black_user() == Some(id) {
                    Some(Side::Black)
                } else {
                    None
                }
            }
        }
    }

    pub fn is_participant(&self, actor: Actor) -> bool {
        self.side_of(actor).is_some()
    }

    pub fn remaining(&self, side: Side) -> i64 {
        match side {
            Side::White => self.white_time,
            Side::Black => self.black_time,
        }
    }

    pub fn set_remaining(&mut self, side: Side, secs: i64) {
        match side {
            Side::White => self.white_time = secs,
            Side::Black => self.black_time = secs,
        }
    }
}

/// Invite lifecycle status. Everything after `Pending` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// A pending challenge from one participant to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteRecord {
    pub id: InviteId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub status: InviteStatus,
    /// Set once the invite is accepted and a match has been created.
    pub match_id: Option<MatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InviteRecord {
    pub fn new(from_user: UserId, to_user: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_user,
            to_user,
            status: InviteStatus::Pending,
            match_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_match_color_mapping() {
        let record = MatchRecord::new_bot(7, BotLevel::Easy, 300);
        assert_eq!(record.white_user, 7);
        assert_eq!(record.black_user(), None);
        assert_eq!(record.bot_side(), Some(Side::Black));
        assert_eq!(record.side_of(Actor::User(7)), Some(Side::White));
        assert_eq!(record.side_of(Actor::Bot), Some(Side::Black));
        assert_eq!(record.side_of(Actor::User(8)), None);
    }

    #[test]
    fn test_pvp_color_mapping_is_fixed() {
        // Host plays black when the coin toss gives white to the target.
        let record = MatchRecord::new_pvp(1, 2, 2, 300);
        assert_eq!(record.side_of(Actor::User(1)), Some(Side::Black));
        assert_eq!(record.side_of(Actor::User(2)), Some(Side::White));
        assert_eq!(record.user_for(Side::Black), Some(1));
        assert_eq!(record.side_of(Actor::Bot), None);
    }

    #[test]
    fn test_new_match_defaults() {
        let record = MatchRecord::new_pvp(1, 2, 1, 300);
        assert_eq!(record.status, MatchStatus::InProgress);
        assert_eq!(record.current_turn, Side::White);
        assert_eq!(record.fen, INITIAL_FEN);
        assert!(record.move_history.is_empty());
        assert_eq!(record.white_time, 300);
        assert_eq!(record.black_time, 300);
        assert!(record.last_move_at.is_none());
    }
}
