//! Request Handlers
//!
//! REST surface for match creation, invite management, and polling-style
//! state fetches. Realtime play happens over the websocket gateway.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::auth::AuthProvider;
use crate::errors::EngineError;
use crate::events::GameStatePayload;
use crate::invites::InviteService;
use crate::model::{Actor, InviteId, MatchId, MatchRecord, Side, UserId};
use crate::registry::SessionRegistry;
use crate::store::MatchStore;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn MatchStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub registry: Arc<SessionRegistry>,
    pub invites: InviteService,
    pub version: String,
}

impl AppState {
    /// Resolve the bearer token on a request to a participant identity.
    pub async fn authed_user(
        &self,
        headers: &HeaderMap,
        request_id: &RequestId,
    ) -> Result<UserId, ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::unauthorized(
                    request_id.0.clone(),
                    "missing bearer token".to_string(),
                )
            })?;

        self.auth
            .authenticate(token)
            .await
            .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))
    }
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// Start a match against the scripted opponent
/// POST /api/matches/bot
pub async fn start_bot_match_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<StartBotMatchRequest>,
) -> Result<(StatusCode, Json<MatchStateResponse>), ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let record = MatchRecord::new_bot(
        user,
        request.level,
        state.registry.game_config().initial_clock_secs,
    );
    let session = state
        .registry
        .start_match(record)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    let game = session.snapshot().await;
    // The host always takes white against the bot.
    Ok((StatusCode::CREATED, Json(annotate(game, Side::White))))
}

/// Polling-style state fetch, mirroring the streamed events
/// GET /api/matches/:id
pub async fn match_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(match_id): Path<MatchId>,
) -> Result<Json<MatchStateResponse>, ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let record = state
        .store
        .fetch_match(match_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e.into()))?
        .ok_or_else(|| {
            ApiError::from_engine(request_id.0.clone(), EngineError::MatchNotFound(match_id))
        })?;

    let player_color = record.side_of(Actor::User(user)).ok_or_else(|| {
        ApiError::from_engine(request_id.0.clone(), EngineError::Forbidden)
    })?;

    Ok(Json(annotate(
        GameStatePayload::from_record(&record),
        player_color,
    )))
}

/// Challenge another participant
/// POST /api/invites
pub async fn create_invite_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let invite = state
        .invites
        .create(user, request.to_user)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse { invite, game: None }),
    ))
}

/// Pending and live invites for the authenticated participant
/// GET /api/invites
pub async fn list_invites_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<InviteListResponse>, ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let inbox = state
        .invites
        .inbox(user)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(InviteListResponse {
        incoming: inbox.incoming,
        outgoing: inbox.outgoing,
    }))
}

/// Accept or decline an invite
/// POST /api/invites/:id/respond
pub async fn respond_invite_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(invite_id): Path<InviteId>,
    Json(request): Json<RespondInviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let (invite, session) = state
        .invites
        .respond(invite_id, user, request.accept)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    let game = match session {
        Some(session) => Some(session.snapshot().await),
        None => None,
    };
    Ok(Json(InviteResponse { invite, game }))
}

/// Withdraw a pending invite
/// POST /api/invites/:id/cancel
pub async fn cancel_invite_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(invite_id): Path<InviteId>,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = state.authed_user(&headers, &request_id).await?;

    let invite = state
        .invites
        .cancel(invite_id, user)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(InviteResponse { invite, game: None }))
}

fn annotate(mut game: GameStatePayload, player_color: Side) -> MatchStateResponse {
    game.player_color = Some(player_color);
    let is_my_turn = game.current_turn == player_color;
    MatchStateResponse {
        game,
        player_color,
        is_my_turn,
    }
}
