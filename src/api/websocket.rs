//! Broadcast gateway: websocket fan-out for live matches.
//!
//! One connection task per client. A connection authenticates, is checked
//! against the match's participants, receives a full `game_state`
//! snapshot, and is then admitted to the match's fan-out group. Inbound
//! `move`/`resign` commands run through the match session; rejections are
//! answered on this connection only. Outbound delivery is best-effort — a
//! connection that lags simply drops events and is never allowed to block
//! the mutation path.

use super::handlers::AppState;
use crate::errors::EngineError;
use crate::events::{ClientCommand, ServerEvent};
use crate::model::{Actor, MatchId, UserId};
use crate::rules::SubmittedMove;
use crate::session::MatchSession;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Close codes for rejected connections.
pub const CLOSE_UNAUTHENTICATED: u16 = 4401;
pub const CLOSE_FORBIDDEN: u16 = 4403;
pub const CLOSE_NOT_FOUND: u16 = 4404;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket endpoint handler
/// GET /ws/:match_id?token=...
pub async fn match_websocket_handler(
    ws: WebSocketUpgrade,
    Path(match_id): Path<MatchId>,
    Query(query): Query<WsAuthQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, match_id, query.token))
}

async fn handle_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    match_id: MatchId,
    token: Option<String>,
) {
    let user = match token {
        Some(token) => state.auth.authenticate(&token).await,
        None => Err(EngineError::Unauthenticated),
    };
    let user = match user {
        Ok(user) => user,
        Err(_) => {
            warn!(%match_id, "ws connect rejected: unauthenticated");
            reject(socket, "auth_failed", CLOSE_UNAUTHENTICATED).await;
            return;
        }
    };

    let session = match state.registry.resolve(match_id).await {
        Ok(session) => session,
        Err(_) => {
            warn!(%match_id, user, "ws connect rejected: match not found");
            reject(socket, "game_not_found", CLOSE_NOT_FOUND).await;
            return;
        }
    };

    let player_color = match session.side_of(Actor::User(user)).await {
        Some(side) => side,
        None => {
            warn!(%match_id, user, "ws connect rejected: not a participant");
            reject(socket, "not_in_game", CLOSE_FORBIDDEN).await;
            return;
        }
    };

    // A live match keeps exactly one clock loop running.
    state.registry.ensure_timer(&session);

    // Snapshot and subscription come from the same lock acquisition, so no
    // event can slip between them.
    let (mut snapshot, rx) = session.subscribe().await;
    snapshot.player_color = Some(player_color);

    let (mut sender, receiver) = socket.split();
    if send_event(&mut sender, &ServerEvent::GameState(snapshot))
        .await
        .is_err()
    {
        return;
    }

    info!(%match_id, user, "ws connected");
    pump(&mut sender, receiver, rx, &session, user).await;
    info!(%match_id, user, "ws disconnected");
}

/// Forward events to the client and commands to the session until either
/// side goes away. Unsubscribing is implicit: dropping the receiver leaves
/// the fan-out group immediately.
async fn pump(
    sender: &mut SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<ServerEvent>,
    session: &Arc<MatchSession>,
    user: UserId,
) {
    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(rejection) = handle_command(session, user, &text).await {
                            if send_event(sender, &rejection).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user, "ws receive error: {}", e);
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Ok(event) => {
                        if send_event(sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user, skipped, "ws subscriber lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Run one client command through the session. Returns the error event to
/// answer on this connection, or `None` when the command was accepted (its
/// effects arrive through the fan-out group).
async fn handle_command(
    session: &Arc<MatchSession>,
    user: UserId,
    text: &str,
) -> Option<ServerEvent> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(_) => {
            return Some(ServerEvent::Error {
                reason: "bad_message".to_string(),
            })
        }
    };

    let result = match command {
        ClientCommand::Move {
            from,
            to,
            promotion,
        } => match SubmittedMove::parse(&from, &to, promotion.as_deref()) {
            Ok(mv) => session.submit_move(Actor::User(user), mv).await.map(|_| ()),
            Err(e) => Err(e),
        },
        ClientCommand::Resign => session.resign(Actor::User(user)).await.map(|_| ()),
    };

    match result {
        Ok(()) => None,
        Err(e) => Some(ServerEvent::Error {
            reason: e.code().to_string(),
        }),
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to serialize event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

/// Answer a rejected connection with an error event, then close it with a
/// reason code.
async fn reject(mut socket: WebSocket, reason: &str, code: u16) {
    let event = ServerEvent::Error {
        reason: reason.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&event) {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
