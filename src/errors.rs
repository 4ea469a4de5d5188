//! Domain error types for the match engine.
//!
//! Validation errors (`NotParticipant`, `OutOfTurn`, `IllegalMove`,
//! `GameNotInProgress`) never mutate state and are always safe to retry.

use crate::model::{InviteId, MatchId, UserId};
use crate::store::StoreError;
use thiserror::Error;

/// Every failure the engine can report to a caller or a connection.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authentication failed")]
    Unauthenticated,

    #[error("not a participant in this match")]
    NotParticipant,

    #[error("access to this resource is forbidden")]
    Forbidden,

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("invite {0} not found or already handled")]
    InviteNotFound(InviteId),

    #[error("match is not in progress")]
    GameNotInProgress,

    #[error("it is not your turn")]
    OutOfTurn,

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("a pending invite to this player already exists")]
    DuplicateInvite,

    #[error("invalid invite target")]
    InvalidTarget,

    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    #[error("reward credit failed for user {user} on match {match_id}: {source}")]
    RewardInconsistency {
        match_id: MatchId,
        user: UserId,
        source: StoreError,
    },
}

impl EngineError {
    /// Stable machine-readable code used in websocket `error` events and
    /// connection close reasons.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unauthenticated => "auth_failed",
            EngineError::NotParticipant => "not_in_game",
            EngineError::Forbidden => "forbidden",
            EngineError::MatchNotFound(_) => "game_not_found",
            EngineError::InviteNotFound(_) => "invite_not_found",
            EngineError::GameNotInProgress => "game_not_in_progress",
            EngineError::OutOfTurn => "out_of_turn",
            EngineError::IllegalMove(_) => "illegal_move",
            EngineError::DuplicateInvite => "duplicate_invite",
            EngineError::InvalidTarget => "invalid_target",
            EngineError::ExternalServiceUnavailable(_) => "service_unavailable",
            EngineError::RewardInconsistency { .. } => "reward_inconsistency",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MatchNotFound(id) => EngineError::MatchNotFound(id),
            StoreError::InviteNotFound(id) => EngineError::InviteNotFound(id),
            StoreError::Unavailable(msg) => EngineError::ExternalServiceUnavailable(msg),
        }
    }
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(EngineError::OutOfTurn.code(), "out_of_turn");
        assert_eq!(
            EngineError::IllegalMove("e2e5".to_string()).code(),
            "illegal_move"
        );
        assert_eq!(EngineError::Unauthenticated.code(), "auth_failed");
    }

    #[test]
    fn test_store_error_conversion() {
        let id = Uuid::new_v4();
        let err: EngineError = StoreError::MatchNotFound(id).into();
        match err {
            EngineError::MatchNotFound(got) => assert_eq!(got, id),
            other => panic!("unexpected conversion: {:?}", other),
        }

        let err: EngineError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, EngineError::ExternalServiceUnavailable(_)));
    }
}
