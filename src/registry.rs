//! Session registry: live match sessions and their timer tasks.
//!
//! Explicit state, passed to everything that starts or stops matches —
//! never an ambient singleton. The timer table guarantees at most one
//! clock loop per match id: inserts go through the map's atomic entry
//! API, and each loop removes its own entry when it observes a terminal
//! status. `stop_timer` only signals; a loop is never cancelled mid-tick.

use crate::bot::MoveOracle;
use crate::config::{BotConfig, GameConfig};
use crate::errors::{EngineError, EngineResult};
use crate::model::{MatchId, MatchRecord, MatchStatus};
use crate::session::{MatchSession, TickOutcome};
use crate::store::MatchStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct TimerHandle {
    stop: Arc<AtomicBool>,
    _task: JoinHandle<()>,
}

pub struct SessionRegistry {
    sessions: DashMap<MatchId, Arc<MatchSession>>,
    timers: Arc<DashMap<MatchId, TimerHandle>>,
    store: Arc<dyn MatchStore>,
    oracle: Arc<dyn MoveOracle>,
    game: GameConfig,
    bot: BotConfig,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn MatchStore>,
        oracle: Arc<dyn MoveOracle>,
        game: GameConfig,
        bot: BotConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            timers: Arc::new(DashMap::new()),
            store,
            oracle,
            game,
            bot,
        })
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.game
    }

    /// Persist a new match, install its session, and start its clock loop.
    pub async fn start_match(&self, record: MatchRecord) -> EngineResult<Arc<MatchSession>> {
        self.store.create_match(record.clone()).await?;
        let session = self.install_session(record)?;
        self.ensure_timer(&session);
        info!(match_id = %session.id(), "match started");
        Ok(session)
    }

    pub fn get(&self, id: MatchId) -> Option<Arc<MatchSession>> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Resolve a session, restoring it from the store when this process
    /// does not have it live (late subscribers, polling clients).
    pub async fn resolve(&self, id: MatchId) -> EngineResult<Arc<MatchSession>> {
        if let Some(session) = self.get(id) {
            return Ok(session);
        }
        let record = self
            .store
            .fetch_match(id)
            .await?
            .ok_or(EngineError::MatchNotFound(id))?;
        let in_progress = record.status == MatchStatus::InProgress;
        let session = self.install_session(record)?;
        if in_progress {
            self.ensure_timer(&session);
        }
        Ok(session)
    }

    fn install_session(&self, record: MatchRecord) -> EngineResult<Arc<MatchSession>> {
        let id = record.id;
        match self.sessions.entry(id) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(vacant) => {
                let session = MatchSession::new(
                    record,
                    self.store.clone(),
                    self.oracle.clone(),
                    self.game.event_buffer,
                    self.bot.retry_limit,
                    Duration::from_millis(self.bot.retry_delay_ms),
                )?;
                vacant.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Ensure exactly one timer task is running for this match.
    /// Insert-if-absent is atomic; a second caller finds the entry occupied.
    pub fn ensure_timer(&self, session: &Arc<MatchSession>) {
        let id = session.id();
        match self.timers.entry(id) {
            Entry::Occupied(_) => {}
            Entry::Vacant(vacant) => {
                let stop = Arc::new(AtomicBool::new(false));
                let stop_flag = stop.clone();
                let timers = self.timers.clone();
                let session = session.clone();
                let period = Duration::from_millis(self.game.tick_interval_ms);

                let task = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    loop {
                        ticker.tick().await;
                        if stop_flag.load(Ordering::Relaxed) {
                            break;
                        }
                        if session.tick().await == TickOutcome::Stop {
                            break;
                        }
                    }
                    timers.remove(&id);
                    debug!(match_id = %id, "timer task stopped");
                });

                vacant.insert(TimerHandle { stop, _task: task });
            }
        }
    }

    pub fn has_timer(&self, id: MatchId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Remove a match's timer entry and ask its loop to wind down at the
    /// next tick. The loop is never cancelled mid-tick.
    pub fn stop_timer(&self, id: MatchId) {
        if let Some((_, handle)) = self.timers.remove(&id) {
            handle.stop.store(true, Ordering::Relaxed);
        }
    }

    /// Signal every timer loop to wind down (server shutdown).
    pub fn stop_all_timers(&self) {
        for handle in self.timers.iter() {
            handle.stop.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ScriptedOracle;
    use crate::model::{Actor, BotLevel};
    use crate::store::InMemoryStore;

    fn fast_registry(store: Arc<InMemoryStore>) -> Arc<SessionRegistry> {
        let game = GameConfig {
            tick_interval_ms: 100,
            ..GameConfig::default()
        };
        SessionRegistry::new(
            store,
            Arc::new(ScriptedOracle::new()),
            game,
            BotConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_one_timer_per_match() {
        let store = Arc::new(InMemoryStore::new());
        let registry = fast_registry(store);

        let record = MatchRecord::new_bot(1, BotLevel::Easy, 300);
        let id = record.id;
        let session = registry.start_match(record).await.unwrap();

        assert!(registry.has_timer(id));
        assert_eq!(registry.timer_count(), 1);

        // Re-ensuring is a no-op.
        registry.ensure_timer(&session);
        registry.ensure_timer(&session);
        assert_eq!(registry.timer_count(), 1);
    }

    #[tokio::test]
    async fn test_timer_removes_itself_when_match_finishes() {
        let store = Arc::new(InMemoryStore::new());
        let registry = fast_registry(store);

        let record = MatchRecord::new_pvp(1, 2, 1, 300);
        let id = record.id;
        let session = registry.start_match(record).await.unwrap();
        session.resign(Actor::User(1)).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.has_timer(id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timer never wound down"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_resolve_restores_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let registry = fast_registry(store.clone());

        // A match persisted by another process lifetime.
        let mut record = MatchRecord::new_pvp(1, 2, 1, 300);
        record.move_history.push("e4".to_string());
        record.fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string();
        record.current_turn = crate::model::Side::Black;
        let id = record.id;
        store.create_match(record).await.unwrap();

        let session = registry.resolve(id).await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.move_history, vec!["e4".to_string()]);
        assert!(registry.has_timer(id));

        // Unknown ids stay unknown.
        let missing = registry.resolve(uuid::Uuid::new_v4()).await;
        assert!(matches!(missing, Err(EngineError::MatchNotFound(_))));
    }

    #[tokio::test]
    async fn test_stop_timer_signals_wind_down() {
        let store = Arc::new(InMemoryStore::new());
        let registry = fast_registry(store);

        let record = MatchRecord::new_pvp(1, 2, 1, 300);
        let id = record.id;
        registry.start_match(record).await.unwrap();
        registry.stop_timer(id);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.has_timer(id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "stop signal was not honored"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
