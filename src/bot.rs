//! Bot move oracle.
//!
//! The oracle is treated as an unreliable external service: it may fail or
//! return nothing, and the session retries it a bounded number of times.
//! `ScriptedOracle` is the built-in implementation; difficulty only changes
//! how a move is picked from the legal set, never whether it is legal —
//! bot moves go through the same validation path as human moves.

use crate::errors::{EngineError, EngineResult};
use crate::model::BotLevel;
use crate::rules::SubmittedMove;
use async_trait::async_trait;
use chess::{Board, ChessMove, MoveGen, Piece};
use rand::seq::SliceRandom;
use std::str::FromStr;

#[async_trait]
pub trait MoveOracle: Send + Sync {
    /// Choose a move for the side to play in `fen`, or `None` when no legal
    /// move exists.
    async fn choose_move(
        &self,
        fen: &str,
        level: BotLevel,
    ) -> EngineResult<Option<SubmittedMove>>;
}

/// Local scripted opponent.
pub struct ScriptedOracle;

impl ScriptedOracle {
    pub fn new() -> Self {
        Self
    }

    fn pick(&self, board: &Board, level: BotLevel) -> Option<ChessMove> {
        let moves: Vec<ChessMove> = MoveGen::new_legal(board).collect();
        if moves.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();

        match level {
            BotLevel::Easy => moves.choose(&mut rng).copied(),
            BotLevel::Medium => {
                let captures: Vec<ChessMove> = moves
                    .iter()
                    .copied()
                    .filter(|m| board.piece_on(m.get_dest()).is_some())
                    .collect();
                captures
                    .choose(&mut rng)
                    .or_else(|| moves.choose(&mut rng))
                    .copied()
            }
            BotLevel::Hard => {
                let best = moves
                    .iter()
                    .copied()
                    .max_by_key(|m| capture_value(board, *m));
                match best {
                    Some(m) if capture_value(board, m) > 0 => Some(m),
                    _ => moves.choose(&mut rng).copied(),
                }
            }
        }
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_value(board: &Board, m: ChessMove) -> u32 {
    match board.piece_on(m.get_dest()) {
        Some(Piece::Pawn) => 1,
        Some(Piece::Knight) | Some(Piece::Bishop) => 3,
        Some(Piece::Rook) => 5,
        Some(Piece::Queen) => 9,
        Some(Piece::King) | None => 0,
    }
}

#[async_trait]
impl MoveOracle for ScriptedOracle {
    async fn choose_move(
        &self,
        fen: &str,
        level: BotLevel,
    ) -> EngineResult<Option<SubmittedMove>> {
        let board = Board::from_str(fen)
            .map_err(|e| EngineError::ExternalServiceUnavailable(format!("bad position: {}", e)))?;
        Ok(self.pick(&board, level).map(SubmittedMove::from))
    }
}
