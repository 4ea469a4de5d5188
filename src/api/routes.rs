//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{handlers::*, websocket::match_websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))
        // Match lifecycle
        .route("/api/matches/bot", post(start_bot_match_handler))
        .route("/api/matches/:match_id", get(match_state_handler))
        // Invites
        .route(
            "/api/invites",
            post(create_invite_handler).get(list_invites_handler),
        )
        .route("/api/invites/:invite_id/respond", post(respond_invite_handler))
        .route("/api/invites/:invite_id/cancel", post(cancel_invite_handler))
        // WebSocket endpoint for realtime play
        .route("/ws/:match_id", get(match_websocket_handler))
        // Attach shared state
        .with_state(state)
}
