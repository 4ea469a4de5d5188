//! Wire messages exchanged over a match's websocket channel.
//!
//! Outbound events are internally tagged with a `type` field so clients
//! can dispatch on it. Payload shapes mirror the polling REST responses.

use crate::model::{
    EndReason, MatchId, MatchOutcome, MatchRecord, MatchStatus, OpponentRef, Side, UserId,
};
use serde::{Deserialize, Serialize};

/// Events pushed to every connection subscribed to a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full snapshot, sent once on subscribe.
    GameState(GameStatePayload),

    /// Incremental update after an accepted move. Carries the game-over
    /// payload inline when the move ended the match.
    Move(MovePayload),

    /// Terminal notification, delivered after the event that caused it.
    GameOver(GameOverPayload),

    /// Periodic clock broadcast. No ordering guarantee relative to moves
    /// beyond never overtaking the terminal event.
    TimerUpdate(TimerUpdatePayload),

    /// Sent to a single connection when its command was rejected.
    Error { reason: String },
}

/// Commands a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Move {
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Resign,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub game_id: MatchId,
    pub fen: String,
    pub move_history: Vec<String>,
    pub last_move: Option<String>,
    pub current_turn: Side,
    pub white_time: i64,
    pub black_time: i64,
    pub status: MatchStatus,
    pub result: Option<MatchOutcome>,
    pub ended_reason: Option<EndReason>,
    pub winner_id: Option<UserId>,
    pub loser_id: Option<UserId>,
    pub opponent: OpponentRef,
    /// The receiving participant's color; filled in per connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_color: Option<Side>,
}

impl GameStatePayload {
    pub fn from_record(record: &MatchRecord) -> Self {
        Self {
            game_id: record.id,
            fen: record.fen.clone(),
            move_history: record.move_history.clone(),
            last_move: record.last_move.clone(),
            current_turn: record.current_turn,
            white_time: record.white_time,
            black_time: record.black_time,
            status: record.status,
            result: record.result,
            ended_reason: record.ended_reason,
            winner_id: record.winner,
            loser_id: record.loser,
            opponent: record.opponent,
            player_color: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovePayload {
    pub game_id: MatchId,
    pub fen: String,
    pub last_move: Option<String>,
    pub move_history: Vec<String>,
    pub current_turn: Side,
    pub white_time: i64,
    pub black_time: i64,
    pub status: MatchStatus,
    pub result: Option<MatchOutcome>,
    pub ended_reason: Option<EndReason>,
    pub winner_id: Option<UserId>,
    pub loser_id: Option<UserId>,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over_payload: Option<GameOverPayload>,
}

impl MovePayload {
    pub fn from_record(record: &MatchRecord, game_over: Option<GameOverPayload>) -> Self {
        Self {
            game_id: record.id,
            fen: record.fen.clone(),
            last_move: record.last_move.clone(),
            move_history: record.move_history.clone(),
            current_turn: record.current_turn,
            white_time: record.white_time,
            black_time: record.black_time,
            status: record.status,
            result: record.result,
            ended_reason: record.ended_reason,
            winner_id: record.winner,
            loser_id: record.loser,
            game_over: game_over.is_some(),
            game_over_payload: game_over,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub game_id: MatchId,
    pub status: MatchStatus,
    pub ended_reason: Option<EndReason>,
    pub winner_id: Option<UserId>,
    pub loser_id: Option<UserId>,
    pub result: Option<MatchOutcome>,
}

impl GameOverPayload {
    pub fn from_record(record: &MatchRecord) -> Self {
        Self {
            game_id: record.id,
            status: record.status,
            ended_reason: record.ended_reason,
            winner_id: record.winner,
            loser_id: record.loser,
            result: record.result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerUpdatePayload {
    pub game_id: MatchId,
    pub white_time: i64,
    pub black_time: i64,
    pub current_turn: Side,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotLevel, MatchRecord};

    #[test]
    fn test_server_event_is_type_tagged() {
        let record = MatchRecord::new_bot(1, BotLevel::Easy, 300);
        let event = ServerEvent::GameState(GameStatePayload::from_record(&record));
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["type"], "game_state");
        assert_eq!(json["current_turn"], "white");
        assert_eq!(json["status"], "IN_PROGRESS");
        // Unset per-connection color is omitted entirely.
        assert!(json.get("player_color").is_none());
    }

    #[test]
    fn test_client_command_parsing() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"move","from":"e2","to":"e4"}"#).expect("parses");
        match cmd {
            ClientCommand::Move { from, to, promotion } => {
                assert_eq!(from, "e2");
                assert_eq!(to, "e4");
                assert!(promotion.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"resign"}"#).expect("parses");
        assert!(matches!(cmd, ClientCommand::Resign));
    }
}
