//! End-to-end match flows through the registry, sessions, and invites.
//! Exercises the realtime engine the way a pair of connected clients would.

use gambit::bot::ScriptedOracle;
use gambit::config::{BotConfig, GameConfig};
use gambit::events::ServerEvent;
use gambit::invites::InviteService;
use gambit::model::{Actor, EndReason, MatchOutcome, MatchRecord, MatchStatus, Side, UserId};
use gambit::registry::SessionRegistry;
use gambit::rules::{Position, SubmittedMove};
use gambit::store::{InMemoryStore, MatchStore};
use std::sync::Arc;

fn build_registry(store: Arc<InMemoryStore>) -> Arc<SessionRegistry> {
    SessionRegistry::new(
        store,
        Arc::new(ScriptedOracle::new()),
        GameConfig::default(),
        BotConfig::default(),
    )
}

fn mv(from: &str, to: &str) -> SubmittedMove {
    SubmittedMove::parse(from, to, None).expect("valid squares")
}

fn parse_uci(uci: &str) -> SubmittedMove {
    let promotion = if uci.len() > 4 { Some(&uci[4..]) } else { None };
    SubmittedMove::parse(&uci[0..2], &uci[2..4], promotion).expect("valid uci")
}

#[tokio::test]
async fn test_invite_accept_play_and_settle() {
    let store = Arc::new(InMemoryStore::new());
    let registry = build_registry(store.clone());
    let invites = InviteService::new(store.clone(), registry.clone());

    // === PHASE 1: challenge and accept ===
    let invite = invites.create(1, 2).await.expect("invite created");
    let (invite, session) = invites.respond(invite.id, 2, true).await.expect("accepted");
    let session = session.expect("acceptance spawns a match");
    assert_eq!(invite.match_id, Some(session.id()));

    let record = store
        .fetch_match(session.id())
        .await
        .unwrap()
        .expect("match persisted");
    let white: UserId = record.white_user;
    let black = if white == 1 { 2 } else { 1 };
    println!("match {} started: white={} black={}", session.id(), white, black);

    // === PHASE 2: play a few moves ===
    session
        .submit_move(Actor::User(white), mv("e2", "e4"))
        .await
        .expect("white opens");
    session
        .submit_move(Actor::User(black), mv("e7", "e5"))
        .await
        .expect("black replies");

    // Wrong side to move is rejected and changes nothing.
    let err = session.submit_move(Actor::User(black), mv("d7", "d6")).await;
    assert!(matches!(err, Err(gambit::errors::EngineError::OutOfTurn)));

    // === PHASE 3: resignation settles the match ===
    session
        .resign(Actor::User(black))
        .await
        .expect("resignation accepted");

    let finished = store
        .fetch_match(session.id())
        .await
        .unwrap()
        .expect("still there");
    assert_eq!(finished.status, MatchStatus::Finished);
    assert_eq!(finished.ended_reason, Some(EndReason::Resign));
    assert_eq!(finished.winner, Some(white));
    assert_eq!(finished.loser, Some(black));

    // PvP win pays the winner only.
    assert_eq!(store.balance(white).await.unwrap(), 50);
    assert_eq!(store.balance(black).await.unwrap(), 0);
    assert_eq!(store.ledger().len(), 1);
}

#[tokio::test]
async fn test_replay_invariant() {
    let store = Arc::new(InMemoryStore::new());
    let registry = build_registry(store.clone());

    let record = MatchRecord::new_pvp(1, 2, 1, 300);
    let id = record.id;
    let session = registry.start_match(record).await.expect("match started");

    // Italian game opening, both sides alternating.
    let script = [
        (1u64, "e2", "e4"),
        (2, "e7", "e5"),
        (1, "g1", "f3"),
        (2, "b8", "c6"),
        (1, "f1", "c4"),
        (2, "g8", "f6"),
        (1, "e1", "g1"),
        (2, "f8", "c5"),
    ];

    let mut accepted_uci = Vec::new();
    for (user, from, to) in script {
        let payload = session
            .submit_move(Actor::User(user), mv(from, to))
            .await
            .expect("scripted move is legal");
        accepted_uci.push(payload.last_move.clone().expect("move recorded"));
    }

    let stored = store.fetch_match(id).await.unwrap().expect("persisted");
    assert_eq!(stored.move_history.len(), script.len());

    // Re-deriving the board from the accepted moves reproduces the stored
    // position exactly.
    let mut replayed = Position::initial();
    for uci in &accepted_uci {
        replayed = replayed
            .apply(parse_uci(uci))
            .expect("replay stays legal")
            .position;
    }
    assert_eq!(replayed.fen(), stored.fen);
    assert_eq!(replayed.side_to_move(), stored.current_turn);
}

#[tokio::test]
async fn test_reconnect_sees_identical_state() {
    let store = Arc::new(InMemoryStore::new());
    let registry = build_registry(store.clone());

    let record = MatchRecord::new_pvp(1, 2, 1, 300);
    let id = record.id;
    let session = registry.start_match(record).await.expect("match started");

    session
        .submit_move(Actor::User(1), mv("d2", "d4"))
        .await
        .unwrap();
    session
        .submit_move(Actor::User(2), mv("d7", "d5"))
        .await
        .unwrap();

    // First subscriber connects, reads the snapshot, then disconnects.
    let (before, rx) = session.subscribe().await;
    drop(rx);

    // The disconnect changed nothing; a reconnect gets the same state.
    let resolved = registry.resolve(id).await.expect("still resolvable");
    let (after, _rx) = resolved.subscribe().await;

    assert_eq!(after.fen, before.fen);
    assert_eq!(after.move_history, before.move_history);
    assert_eq!(after.current_turn, before.current_turn);
    assert_eq!(after.white_time, before.white_time);
    assert_eq!(after.black_time, before.black_time);
    assert_eq!(after.status, MatchStatus::InProgress);
}

#[tokio::test]
async fn test_mate_in_one_pays_the_winner_once() {
    let store = Arc::new(InMemoryStore::new());
    let registry = build_registry(store.clone());

    // Lone queen delivers mate: Qa1-a8#.
    let mut record = MatchRecord::new_pvp(1, 2, 1, 300);
    record.fen = "6k1/8/6K1/8/8/8/8/Q7 w - - 0 1".to_string();
    let id = record.id;
    let session = registry.start_match(record).await.expect("match started");

    let (_, mut rx) = session.subscribe().await;
    let payload = session
        .submit_move(Actor::User(1), mv("a1", "a8"))
        .await
        .expect("mating move is legal");
    assert!(payload.game_over);

    // The move event precedes the terminal event.
    assert!(matches!(rx.recv().await.unwrap(), ServerEvent::Move(_)));
    match rx.recv().await.unwrap() {
        ServerEvent::GameOver(over) => {
            assert_eq!(over.ended_reason, Some(EndReason::Checkmate));
            assert_eq!(over.winner_id, Some(1));
            assert_eq!(over.result, Some(MatchOutcome::Win));
        }
        other => panic!("expected game over, got {:?}", other),
    }

    let stored = store.fetch_match(id).await.unwrap().expect("persisted");
    assert_eq!(stored.status, MatchStatus::Finished);
    assert_eq!(stored.winner, Some(1));
    assert_eq!(stored.loser, Some(2));
    assert_eq!(stored.current_turn, Side::Black);

    // Exactly one credit.
    let ledger = store.ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].user, 1);
    assert_eq!(ledger[0].amount, 50);
}
