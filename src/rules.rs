//! Chess rules engine.
//!
//! Wraps the `chess` crate's board and legal move generation behind a
//! small pure interface: resolve a submitted (from, to, promotion) move
//! against the legal move set, apply it, render its SAN, and classify the
//! resulting position. No side effects anywhere in this module.

use crate::errors::{EngineError, EngineResult};
use crate::model::Side;
use chess::{Board, BoardStatus, ChessMove, Color, File, Game, MoveGen, Piece, Rank, Square};
use std::str::FromStr;

/// A move as submitted by a client or the bot oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
}

impl SubmittedMove {
    /// Parse square names and an optional promotion piece letter.
    pub fn parse(from: &str, to: &str, promotion: Option<&str>) -> EngineResult<Self> {
        let uci = format!("{}{}{}", from, to, promotion.unwrap_or(""));
        let from = Square::from_str(from).map_err(|_| EngineError::IllegalMove(uci.clone()))?;
        let to = Square::from_str(to).map_err(|_| EngineError::IllegalMove(uci.clone()))?;
        let promotion = match promotion {
            None | Some("") => None,
            Some(p) => Some(match p.to_ascii_lowercase().as_str() {
                "q" => Piece::Queen,
                "r" => Piece::Rook,
                "b" => Piece::Bishop,
                "n" => Piece::Knight,
                _ => return Err(EngineError::IllegalMove(uci)),
            }),
        };
        Ok(Self { from, to, promotion })
    }

    /// Coordinate notation, e.g. `e2e4` or `e7e8q`.
    pub fn uci(&self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(p) = self.promotion {
            s.push(piece_letter(p).to_ascii_lowercase());
        }
        s
    }
}

impl From<ChessMove> for SubmittedMove {
    fn from(m: ChessMove) -> Self {
        Self {
            from: m.get_source(),
            to: m.get_dest(),
            promotion: m.get_promotion(),
        }
    }
}

/// Terminal-state classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ongoing,
    Checkmate { loser: Side },
    Stalemate,
    InsufficientMaterial,
    DrawClaimable,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Verdict::Ongoing)
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            Verdict::Stalemate | Verdict::InsufficientMaterial | Verdict::DrawClaimable
        )
    }
}

/// A successfully applied move.
#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub position: Position,
    pub san: String,
    pub uci: String,
}

/// A legal, reachable game position.
///
/// Carries the underlying game history so draw claims (threefold
/// repetition, fifty-move rule) can be detected while a session is live.
#[derive(Debug, Clone)]
pub struct Position {
    game: Game,
}

impl Position {
    pub fn initial() -> Self {
        Self { game: Game::new() }
    }

    pub fn from_fen(fen: &str) -> EngineResult<Self> {
        let board = Board::from_str(fen).map_err(|e| {
            EngineError::ExternalServiceUnavailable(format!("invalid stored position: {}", e))
        })?;
        Ok(Self {
            game: Game::new_with_board(board),
        })
    }

    fn board(&self) -> Board {
        self.game.current_position()
    }

    pub fn fen(&self) -> String {
        self.board().to_string()
    }

    pub fn side_to_move(&self) -> Side {
        self.board().side_to_move().into()
    }

    /// All legal moves in the current position.
    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board()).collect()
    }

    /// Resolve a submitted move against the legal move set.
    ///
    /// Promotion defaults to queen when the move is a pawn push to the last
    /// rank and no piece was named; a promotion letter on a non-promoting
    /// move is ignored.
    pub fn resolve(&self, mv: SubmittedMove) -> EngineResult<ChessMove> {
        let board = self.board();
        let promoting = board.piece_on(mv.from) == Some(Piece::Pawn)
            && mv.to.get_rank() == promotion_rank(board.side_to_move());
        let promotion = if promoting {
            Some(mv.promotion.unwrap_or(Piece::Queen))
        } else {
            None
        };
        let resolved = ChessMove::new(mv.from, mv.to, promotion);
        if board.legal(resolved) {
            Ok(resolved)
        } else {
            Err(EngineError::IllegalMove(mv.uci()))
        }
    }

    /// Apply a submitted move, returning the new position together with the
    /// move's SAN and coordinate renderings. Pure: `self` is not modified.
    pub fn apply(&self, mv: SubmittedMove) -> EngineResult<AppliedMove> {
        let resolved = self.resolve(mv)?;
        let board = self.board();
        let san = san_for_move(&board, resolved);
        let mut next = self.clone();
        if !next.game.make_move(resolved) {
            return Err(EngineError::IllegalMove(mv.uci()));
        }
        Ok(AppliedMove {
            position: next,
            san,
            uci: SubmittedMove::from(resolved).uci(),
        })
    }

    /// Classify the position: ongoing, or one of the terminal states.
    pub fn classify(&self) -> Verdict {
        let board = self.board();
        match board.status() {
            BoardStatus::Checkmate => Verdict::Checkmate {
                loser: board.side_to_move().into(),
            },
            BoardStatus::Stalemate => Verdict::Stalemate,
            BoardStatus::Ongoing => {
                if insufficient_material(&board) {
                    Verdict::InsufficientMaterial
                } else if self.game.can_declare_draw() {
                    Verdict::DrawClaimable
                } else {
                    Verdict::Ongoing
                }
            }
        }
    }
}

fn promotion_rank(color: Color) -> Rank {
    match color {
        Color::White => Rank::Eighth,
        Color::Black => Rank::First,
    }
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn file_char(file: File) -> char {
    (b'a' + file.to_index() as u8) as char
}

fn rank_char(rank: Rank) -> char {
    (b'1' + rank.to_index() as u8) as char
}

/// Render a legal move in standard algebraic notation for the given board.
fn san_for_move(board: &Board, m: ChessMove) -> String {
    let src = m.get_source();
    let dst = m.get_dest();
    let piece = match board.piece_on(src) {
        Some(p) => p,
        None => return SubmittedMove::from(m).uci(),
    };

    let castled = piece == Piece::King
        && src.get_file().to_index().abs_diff(dst.get_file().to_index()) == 2;

    let mut san = if castled {
        if dst.get_file().to_index() > src.get_file().to_index() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else {
        // A pawn only ever changes file when capturing, which also covers
        // en passant where the destination square is empty.
        let capture = match piece {
            Piece::Pawn => src.get_file() != dst.get_file(),
            _ => board.piece_on(dst).is_some(),
        };

        let mut s = String::new();
        if piece != Piece::Pawn {
            s.push(piece_letter(piece));
            if piece != Piece::King {
                s.push_str(&disambiguation(board, m, piece));
            }
        }
        if capture {
            if piece == Piece::Pawn {
                s.push(file_char(src.get_file()));
            }
            s.push('x');
        }
        s.push_str(&dst.to_string());
        if let Some(promo) = m.get_promotion() {
            s.push('=');
            s.push(piece_letter(promo));
        }
        s
    };

    let after = board.make_move_new(m);
    match after.status() {
        BoardStatus::Checkmate => san.push('#'),
        _ => {
            if after.checkers().popcnt() > 0 {
                san.push('+');
            }
        }
    }
    san
}

/// SAN source disambiguation: file if unique, then rank, then full square.
fn disambiguation(board: &Board, m: ChessMove, piece: Piece) -> String {
    let src = m.get_source();
    let rivals: Vec<Square> = MoveGen::new_legal(board)
        .filter(|other| {
            other.get_dest() == m.get_dest()
                && other.get_source() != src
                && board.piece_on(other.get_source()) == Some(piece)
        })
        .map(|other| other.get_source())
        .collect();

    if rivals.is_empty() {
        return String::new();
    }
    if rivals.iter().all(|s| s.get_file() != src.get_file()) {
        file_char(src.get_file()).to_string()
    } else if rivals.iter().all(|s| s.get_rank() != src.get_rank()) {
        rank_char(src.get_rank()).to_string()
    } else {
        src.to_string()
    }
}

/// Dead-position check: K v K, K+minor v K, and bishops all standing on the
/// same square color.
fn insufficient_material(board: &Board) -> bool {
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }

    let knights = *board.pieces(Piece::Knight);
    let bishops = *board.pieces(Piece::Bishop);
    if knights.popcnt() + bishops.popcnt() <= 1 {
        return true;
    }
    if knights.popcnt() > 0 {
        return false;
    }

    let mut shade: Option<usize> = None;
    for sq in bishops {
        let s = (sq.get_rank().to_index() + sq.get_file().to_index()) % 2;
        match shade {
            None => shade = Some(s),
            Some(prev) if prev == s => {}
            Some(_) => return false,
        }
    }
    true
}
