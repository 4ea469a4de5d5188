//! REST request/response shapes.
//!
//! Mirrors the streamed websocket payloads so polling clients see the same
//! data as subscribers.

use crate::events::GameStatePayload;
use crate::model::{BotLevel, InviteRecord, Side, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct StartBotMatchRequest {
    pub level: BotLevel,
}

/// Polling-style match state, annotated for the requesting participant.
#[derive(Debug, Serialize)]
pub struct MatchStateResponse {
    pub game: GameStatePayload,
    pub player_color: Side,
    pub is_my_turn: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub to_user: UserId,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invite: InviteRecord,
    /// Present when acceptance just spawned a match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameStatePayload>,
}

#[derive(Debug, Deserialize)]
pub struct RespondInviteRequest {
    pub accept: bool,
}

#[derive(Debug, Serialize)]
pub struct InviteListResponse {
    pub incoming: Vec<InviteRecord>,
    pub outgoing: Vec<InviteRecord>,
}
