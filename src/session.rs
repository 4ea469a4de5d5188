//! Match session: the single serialized mutation path for one match.
//!
//! Every state transition — move application, resignation, clock-driven
//! timeout, bot-move injection — goes through the session's mutex, so at
//! most one mutation is in flight per match at any instant. Events are
//! emitted through a non-blocking broadcast channel while the lock is
//! held, which fixes their order without ever waiting on a subscriber.
//! The idempotent finish guard is a backstop against racing terminal
//! triggers, not a substitute for that serialization: crediting must not
//! run twice.

use crate::bot::MoveOracle;
use crate::clock;
use crate::errors::{EngineError, EngineResult};
use crate::events::{
    GameOverPayload, GameStatePayload, MovePayload, ServerEvent, TimerUpdatePayload,
};
use crate::model::{
    Actor, EndReason, MatchId, MatchOutcome, MatchRecord, MatchStatus, OpponentRef, Side, UserId,
};
use crate::rewards::{self, OpponentClass};
use crate::rules::{Position, SubmittedMove, Verdict};
use crate::store::MatchStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

/// What the owning timer task should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

struct SessionState {
    record: MatchRecord,
    position: Position,
}

struct FinishSpec {
    reason: EndReason,
    winner_side: Option<Side>,
    loser_side: Option<Side>,
}

impl FinishSpec {
    fn decisive(reason: EndReason, loser: Side) -> Self {
        Self {
            reason,
            winner_side: Some(loser.opposite()),
            loser_side: Some(loser),
        }
    }

    fn draw() -> Self {
        Self {
            reason: EndReason::Draw,
            winner_side: None,
            loser_side: None,
        }
    }
}

/// Owns one match's mutable state for its lifetime.
pub struct MatchSession {
    id: MatchId,
    store: Arc<dyn MatchStore>,
    oracle: Arc<dyn MoveOracle>,
    events: broadcast::Sender<ServerEvent>,
    state: Mutex<SessionState>,
    bot_retry_limit: u32,
    bot_retry_delay: Duration,
}

impl MatchSession {
    pub fn new(
        record: MatchRecord,
        store: Arc<dyn MatchStore>,
        oracle: Arc<dyn MoveOracle>,
        event_buffer: usize,
        bot_retry_limit: u32,
        bot_retry_delay: Duration,
    ) -> EngineResult<Arc<Self>> {
        let position = Position::from_fen(&record.fen)?;
        let (events, _) = broadcast::channel(event_buffer);
        Ok(Arc::new(Self {
            id: record.id,
            store,
            oracle,
            events,
            state: Mutex::new(SessionState { record, position }),
            bot_retry_limit,
            bot_retry_delay,
        }))
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Subscribe to this match's event stream and get a consistent snapshot.
    /// Events emitted after the snapshot are guaranteed to reach the
    /// returned receiver.
    pub async fn subscribe(&self) -> (GameStatePayload, broadcast::Receiver<ServerEvent>) {
        let state = self.state.lock().await;
        let rx = self.events.subscribe();
        (GameStatePayload::from_record(&state.record), rx)
    }

    pub async fn snapshot(&self) -> GameStatePayload {
        let state = self.state.lock().await;
        GameStatePayload::from_record(&state.record)
    }

    pub async fn is_participant(&self, actor: Actor) -> bool {
        self.state.lock().await.record.is_participant(actor)
    }

    pub async fn side_of(&self, actor: Actor) -> Option<Side> {
        self.state.lock().await.record.side_of(actor)
    }

    /// Submit a move. Bot and human moves share this path: identical
    /// guards, identical legality check.
    pub async fn submit_move(
        self: &Arc<Self>,
        actor: Actor,
        mv: SubmittedMove,
    ) -> EngineResult<MovePayload> {
        let mut state = self.state.lock().await;

        if !state.record.is_participant(actor) {
            return Err(EngineError::NotParticipant);
        }
        if state.record.status != MatchStatus::InProgress {
            return Err(EngineError::GameNotInProgress);
        }

        let now = Utc::now();

        // A move submitted after the flag fell loses the race: the timeout
        // outcome is recorded and the move is rejected.
        let snap = clock::snapshot(&state.record, now);
        if let Some(expired) = snap.timed_out {
            let payload = self
                .finish_and_persist(&mut state, FinishSpec::decisive(EndReason::Timeout, expired), now)
                .await?;
            self.emit(ServerEvent::GameOver(payload));
            return Err(EngineError::GameNotInProgress);
        }

        let mover = state.record.side_of(actor).ok_or(EngineError::NotParticipant)?;
        if mover != state.record.current_turn {
            return Err(EngineError::OutOfTurn);
        }

        let applied = state.position.apply(mv)?;

        let mut next = state.record.clone();
        let elapsed = clock::elapsed_seconds(next.last_move_at, now);
        next.set_remaining(mover, clock::debit(next.remaining(mover), elapsed));
        next.fen = applied.position.fen();
        next.last_move = Some(applied.uci.clone());
        next.move_history.push(applied.san.clone());
        next.current_turn = applied.position.side_to_move();
        next.last_move_at = Some(now);

        let verdict = applied.position.classify();
        let finished = verdict.is_terminal();
        let credits = if finished {
            let spec = match verdict {
                Verdict::Checkmate { loser } => FinishSpec::decisive(EndReason::Checkmate, loser),
                _ => FinishSpec::draw(),
            };
            apply_finish(&mut next, spec, now);
            let credits = planned_credits(&next);
            next.coins_earned = host_amount(&credits, next.host);
            credits
        } else {
            Vec::new()
        };

        self.store.update_match(&next).await?;
        state.record = next;
        state.position = applied.position;
        self.settle(credits).await;

        let over_payload = finished.then(|| GameOverPayload::from_record(&state.record));
        let payload = MovePayload::from_record(&state.record, over_payload.clone());
        self.emit(ServerEvent::Move(payload.clone()));
        if let Some(over) = over_payload {
            self.emit(ServerEvent::GameOver(over));
        }

        let bot_follow_up = state.record.status == MatchStatus::InProgress
            && state.record.bot_side() == Some(state.record.current_turn);
        drop(state);

        if bot_follow_up {
            self.spawn_bot_turn();
        }
        Ok(payload)
    }

    /// Resign: the acting side loses immediately.
    pub async fn resign(&self, actor: Actor) -> EngineResult<GameOverPayload> {
        let mut state = self.state.lock().await;

        if !state.record.is_participant(actor) {
            return Err(EngineError::NotParticipant);
        }
        if state.record.status != MatchStatus::InProgress {
            return Err(EngineError::GameNotInProgress);
        }

        let side = state.record.side_of(actor).ok_or(EngineError::NotParticipant)?;
        let payload = self
            .finish_and_persist(
                &mut state,
                FinishSpec::decisive(EndReason::Resign, side),
                Utc::now(),
            )
            .await?;
        self.emit(ServerEvent::GameOver(payload.clone()));
        Ok(payload)
    }

    /// One pass of the owning timer task.
    pub async fn tick(&self) -> TickOutcome {
        let mut state = self.state.lock().await;
        if state.record.status != MatchStatus::InProgress {
            return TickOutcome::Stop;
        }

        let now = Utc::now();
        let snap = clock::snapshot(&state.record, now);
        match snap.timed_out {
            Some(expired) => {
                match self
                    .finish_and_persist(
                        &mut state,
                        FinishSpec::decisive(EndReason::Timeout, expired),
                        now,
                    )
                    .await
                {
                    Ok(payload) => {
                        self.emit(ServerEvent::GameOver(payload));
                        TickOutcome::Stop
                    }
                    Err(e) => {
                        // Store hiccup: leave the match in progress and let
                        // the next tick retry the timeout.
                        warn!(match_id = %self.id, "timeout persist failed: {}", e);
                        TickOutcome::Continue
                    }
                }
            }
            None => {
                self.emit(ServerEvent::TimerUpdate(TimerUpdatePayload {
                    game_id: self.id,
                    white_time: snap.white_time,
                    black_time: snap.black_time,
                    current_turn: snap.current_turn,
                }));
                TickOutcome::Continue
            }
        }
    }

    /// External disconnect-policy signal: mark the match abandoned.
    /// No rewards are paid.
    pub async fn abandon(&self) -> EngineResult<GameOverPayload> {
        let mut state = self.state.lock().await;
        if state.record.status != MatchStatus::InProgress {
            return Ok(GameOverPayload::from_record(&state.record));
        }

        let mut next = state.record.clone();
        next.status = MatchStatus::Abandoned;
        next.finished_at = Some(Utc::now());
        self.store.update_match(&next).await?;
        state.record = next;

        let payload = GameOverPayload::from_record(&state.record);
        self.emit(ServerEvent::GameOver(payload.clone()));
        Ok(payload)
    }

    /// Kick off a detached bot turn. The oracle is awaited with the match
    /// lock released; the lock is re-acquired only to apply the move.
    pub fn spawn_bot_turn(self: &Arc<Self>) {
        let session = self.clone();
        tokio::spawn(async move { session.drive_bot().await });
    }

    async fn drive_bot(self: Arc<Self>) {
        let mut attempts = 0u32;
        loop {
            let (fen, level) = {
                let state = self.state.lock().await;
                if state.record.status != MatchStatus::InProgress {
                    return;
                }
                if state.record.bot_side() != Some(state.record.current_turn) {
                    return;
                }
                let Some(level) = state.record.bot_level() else {
                    return;
                };
                (state.record.fen.clone(), level)
            };

            attempts += 1;
            match self.oracle.choose_move(&fen, level).await {
                Ok(Some(mv)) => match self.submit_move(Actor::Bot, mv).await {
                    Ok(_) => return,
                    Err(EngineError::GameNotInProgress) => return,
                    Err(e) => warn!(match_id = %self.id, attempts, "bot move rejected: {}", e),
                },
                Ok(None) => return,
                Err(e) => warn!(match_id = %self.id, attempts, "bot oracle failed: {}", e),
            }

            if attempts >= self.bot_retry_limit {
                error!(match_id = %self.id, attempts, "bot oracle exhausted, bot turn still pending");
                self.emit(ServerEvent::Error {
                    reason: "bot_unavailable".to_string(),
                });
                return;
            }
            tokio::time::sleep(self.bot_retry_delay).await;
        }
    }

    /// Transition to FINISHED, persist, then settle rewards exactly once.
    /// Re-finishing an already terminal match returns the recorded outcome
    /// unchanged and runs no reward logic.
    async fn finish_and_persist(
        &self,
        state: &mut SessionState,
        spec: FinishSpec,
        now: DateTime<Utc>,
    ) -> EngineResult<GameOverPayload> {
        if state.record.status != MatchStatus::InProgress {
            return Ok(GameOverPayload::from_record(&state.record));
        }

        let mut next = state.record.clone();
        apply_finish(&mut next, spec, now);
        let credits = planned_credits(&next);
        next.coins_earned = host_amount(&credits, next.host);

        self.store.update_match(&next).await?;
        state.record = next;
        self.settle(credits).await;

        Ok(GameOverPayload::from_record(&state.record))
    }

    /// Credit each payable participant. A failed credit leaves the terminal
    /// status authoritative: it is logged and surfaced, never rolled back.
    async fn settle(&self, credits: Vec<(UserId, i64, String)>) {
        for (user, amount, reason) in credits {
            match self.store.credit(user, amount, &reason).await {
                Ok(balance) => {
                    info!(match_id = %self.id, user, amount, balance, "reward credited");
                }
                Err(source) => {
                    let err = EngineError::RewardInconsistency {
                        match_id: self.id,
                        user,
                        source,
                    };
                    error!("{}", err);
                    self.emit(ServerEvent::Error {
                        reason: err.code().to_string(),
                    });
                }
            }
        }
    }

    fn emit(&self, event: ServerEvent) {
        // Best effort: no subscribers is fine, slow subscribers lag out.
        let _ = self.events.send(event);
    }
}

fn apply_finish(record: &mut MatchRecord, spec: FinishSpec, now: DateTime<Utc>) {
    record.status = MatchStatus::Finished;
    record.ended_reason = Some(spec.reason);
    record.finished_at = Some(now);

    let winner = spec.winner_side.and_then(|s| record.user_for(s));
    let loser = spec.loser_side.and_then(|s| record.user_for(s));
    record.winner = winner;
    record.loser = loser;
    record.result = Some(
        if spec.winner_side.is_none() && spec.loser_side.is_none() {
            MatchOutcome::Draw
        } else if winner == Some(record.host) {
            MatchOutcome::Win
        } else {
            MatchOutcome::Lose
        },
    );

    if spec.reason == EndReason::Timeout {
        if let Some(side) = spec.loser_side {
            record.set_remaining(side, 0);
        }
    }
}

/// The credits a finished match owes: bot matches pay the human only,
/// drawn PvP matches pay both sides, PvP wins pay only the winner.
fn planned_credits(record: &MatchRecord) -> Vec<(UserId, i64, String)> {
    let Some(outcome) = record.result else {
        return Vec::new();
    };

    match record.opponent {
        OpponentRef::Bot { level } => {
            let amount = rewards::reward(OpponentClass::Bot(level), outcome);
            if amount > 0 {
                let label = match outcome {
                    MatchOutcome::Win => "win",
                    MatchOutcome::Draw => "draw",
                    MatchOutcome::Lose => "loss",
                };
                vec![(
                    record.host,
                    amount,
                    format!("Chess: {} vs {} bot", label, level),
                )]
            } else {
                Vec::new()
            }
        }
        OpponentRef::User { id: opponent } => match outcome {
            MatchOutcome::Draw => {
                let amount = rewards::reward(OpponentClass::Player, MatchOutcome::Draw);
                vec![
                    (record.host, amount, "Chess: draw".to_string()),
                    (opponent, amount, "Chess: draw".to_string()),
                ]
            }
            _ => match record.winner {
                Some(winner) => {
                    let amount = rewards::reward(OpponentClass::Player, MatchOutcome::Win);
                    vec![(winner, amount, "Chess: win".to_string())]
                }
                None => Vec::new(),
            },
        },
    }
}

fn host_amount(credits: &[(UserId, i64, String)], host: UserId) -> i64 {
    credits
        .iter()
        .find(|(user, _, _)| *user == host)
        .map(|(_, amount, _)| *amount)
        .unwrap_or(0)
}
