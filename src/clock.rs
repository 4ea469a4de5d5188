//! Turn-clock accounting.
//!
//! Whole-second resolution. Only the side on move is ever debited; the
//! debit happens when a move is accepted and on every periodic tick.

use crate::model::{MatchRecord, Side};
use chrono::{DateTime, Utc};

/// Whole seconds elapsed since the last accepted move, floored and never
/// negative. A match with no moves yet has no running clock.
pub fn elapsed_seconds(last_move_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match last_move_at {
        None => 0,
        Some(t) => (now - t).num_seconds().max(0),
    }
}

/// Remaining time after a debit, floored at zero.
pub fn debit(remaining: i64, elapsed: i64) -> i64 {
    (remaining - elapsed).max(0)
}

pub fn is_expired(remaining: i64) -> bool {
    remaining <= 0
}

/// Both sides' live remaining time, derived from the record and wall time.
/// Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white_time: i64,
    pub black_time: i64,
    pub current_turn: Side,
    /// Set when the on-move side's clock has run out.
    pub timed_out: Option<Side>,
}

pub fn snapshot(record: &MatchRecord, now: DateTime<Utc>) -> ClockSnapshot {
    let elapsed = elapsed_seconds(record.last_move_at, now);
    let mut white_time = record.white_time;
    let mut black_time = record.black_time;

    match record.current_turn {
        Side::White => white_time = debit(white_time, elapsed),
        Side::Black => black_time = debit(black_time, elapsed),
    }

    let on_move_remaining = match record.current_turn {
        Side::White => white_time,
        Side::Black => black_time,
    };

    ClockSnapshot {
        white_time,
        black_time,
        current_turn: record.current_turn,
        timed_out: if is_expired(on_move_remaining) {
            Some(record.current_turn)
        } else {
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotLevel, MatchRecord};
    use chrono::Duration;

    #[test]
    fn test_elapsed_floors_and_never_goes_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_seconds(None, now), 0);
        assert_eq!(
            elapsed_seconds(Some(now - Duration::milliseconds(2900)), now),
            2
        );
        // A clock skew that puts the last move in the future still reads 0.
        assert_eq!(elapsed_seconds(Some(now + Duration::seconds(5)), now), 0);
    }

    #[test]
    fn test_debit_floors_at_zero() {
        assert_eq!(debit(300, 10), 290);
        assert_eq!(debit(5, 10), 0);
        assert_eq!(debit(0, 1), 0);
    }

    #[test]
    fn test_only_on_move_side_is_debited() {
        let mut record = MatchRecord::new_bot(1, BotLevel::Easy, 300);
        let now = Utc::now();
        record.last_move_at = Some(now - Duration::seconds(30));

        let snap = snapshot(&record, now);
        assert_eq!(snap.white_time, 270);
        assert_eq!(snap.black_time, 300);
        assert_eq!(snap.timed_out, None);
    }

    #[test]
    fn test_expired_on_move_side_flags_timeout() {
        let mut record = MatchRecord::new_bot(1, BotLevel::Easy, 300);
        let now = Utc::now();
        record.current_turn = Side::Black;
        record.black_time = 10;
        record.last_move_at = Some(now - Duration::seconds(11));

        let snap = snapshot(&record, now);
        assert_eq!(snap.black_time, 0);
        assert_eq!(snap.timed_out, Some(Side::Black));
        // The side not on move keeps its full clock.
        assert_eq!(snap.white_time, 300);
    }
}
