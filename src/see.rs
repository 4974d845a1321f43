//! Static exchange evaluation: the likely material swing of a capture
//! sequence on a single square, without playing any moves on the
//! board.
//!
//! Adapted from the teacher lineage's `MoveGenerator::evaluate_move`:
//! the same `gain[]` negamax-over-an-exchange-tree technique, the same
//! early-exit once the sign of the result is decided, generalised to
//! this crate's `Position`/`Move`/`BoardGeometry` types and extended
//! with the pinned-attacker restriction named explicitly in the data
//! model: a pinned attacker may not join the exchange unless capturing
//! on the exchange square is itself along the pin line.

use crate::basetypes::*;
use crate::bitsets::*;
use crate::eval;
use crate::geometry::BoardGeometry;
use crate::moves::{Move, MOVE_PROMOTION};
use crate::position::Position;
use std::cmp::max;

pub type Value = i32;

/// Shares `eval`'s material units (¤4.6 requires the same scale as
/// eval's material term); the king gets a sentinel value large enough
/// that it is never profitably "spent" first in an exchange.
const KING_SEE_VALUE: Value = 20 * eval::PIECE_VALUES[QUEEN];

const PIECE_VALUES: [Value; 7] = [
    KING_SEE_VALUE,
    eval::PIECE_VALUES[QUEEN],
    eval::PIECE_VALUES[ROOK],
    eval::PIECE_VALUES[BISHOP],
    eval::PIECE_VALUES[KNIGHT],
    eval::PIECE_VALUES[PAWN],
    0,
];

/// Returns the material swing of playing `m`, assuming both sides play
/// the locally optimal continuation of captures on the destination
/// square. Positive means the mover comes out ahead.
///
/// `m` must be a pseudo-legal move for `position` (as produced by
/// `Position::generate_moves`, `try_move_digest`, or `null_move`).
pub fn see(position: &Position, m: Move) -> Value {
    let moved_piece = m.moved_piece();
    let captured_piece = m.captured_piece();
    debug_assert!(moved_piece < NO_PIECE);
    debug_assert!(captured_piece <= NO_PIECE);

    let exchange_square = m.dest_square();
    let geometry = BoardGeometry::get();
    let piece_type = position.piece_type();
    let color = position.color();
    let straight_sliders = piece_type[QUEEN] | piece_type[ROOK];
    let diag_sliders = piece_type[QUEEN] | piece_type[BISHOP];
    let pinned = position.pinned();
    let king_square = position.king_square();

    let mut us = position.to_move();
    let mut piece = moved_piece;
    let mut depth = 0usize;
    let mut orig_square_bb = 1u64 << m.orig_square();
    let mut attackers_and_defenders = position.attacks_to(WHITE, exchange_square)
        | position.attacks_to(BLACK, exchange_square);

    let mut gain = [0 as Value; 34];
    gain[0] = if m.move_type() == MOVE_PROMOTION {
        piece = m.result_piece();
        PIECE_VALUES[captured_piece] + PIECE_VALUES[piece] - PIECE_VALUES[PAWN]
    } else {
        PIECE_VALUES[captured_piece]
    };

    'exchange: while orig_square_bb != 0 {
        let current_gain = gain[depth];
        let speculative_gain = PIECE_VALUES[piece] - current_gain;
        gain[depth + 1] = speculative_gain;

        if max(-current_gain, speculative_gain) < 0 {
            break;
        }

        attackers_and_defenders &= !orig_square_bb;

        let vacated_square = bitscan_1bit(orig_square_bb);
        let behind = position.occupied() & geometry.squares_behind[exchange_square][vacated_square];
        if behind & (straight_sliders | diag_sliders) != 0 && piece != KING {
            let straight_hit = behind & straight_sliders & geometry.piece_attacks_from(behind, ROOK, exchange_square);
            attackers_and_defenders |= if straight_hit != 0 {
                straight_hit
            } else {
                behind & diag_sliders & geometry.piece_attacks_from(behind, BISHOP, exchange_square)
            };
        }

        us = 1 ^ us;

        let mut candidates = attackers_and_defenders & color[us];
        // A pinned piece may only join the exchange if recapturing on
        // this square keeps it on the line to its own king.
        if candidates & pinned != 0 {
            let allowed_line = geometry.squares_at_line[king_square][exchange_square];
            candidates &= !pinned | allowed_line;
        }

        if candidates != 0 {
            let mut found = false;
            for p in (KING..NO_PIECE).rev() {
                let bb = candidates & piece_type[p];
                if bb != 0 {
                    depth += 1;
                    piece = p;
                    orig_square_bb = ls1b(bb);
                    found = true;
                    break;
                }
            }
            if found {
                continue 'exchange;
            }
        }
        break 'exchange;
    }

    while depth > 0 {
        gain[depth - 1] = -max(-gain[depth - 1], gain[depth]);
        depth -= 1;
    }
    gain[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::MoveStack;

    fn find_move(position: &Position, orig: Square, dest: Square) -> Move {
        let mut stack = MoveStack::new();
        stack.save();
        position.generate_moves(false, &mut stack);
        let m = stack
            .current_slice()
            .iter()
            .find(|m| m.orig_square() == orig && m.dest_square() == dest)
            .copied()
            .expect("move not found");
        stack.restore();
        m
    }

    #[test]
    fn pawn_takes_undefended_queen_is_a_clear_win() {
        let position = Position::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let m = find_move(&position, E4, D5);
        assert!(see(&position, m) > 0);
    }

    #[test]
    fn queen_takes_pawn_defended_by_pawn_loses_material() {
        let position = Position::from_fen("4k3/8/8/3p4/8/2p5/3Q4/4K3 w - - 0 1").unwrap();
        let m = find_move(&position, D2, D5);
        assert!(see(&position, m) < 0);
    }

    #[test]
    fn equal_trade_is_exactly_even() {
        let position = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let m = find_move(&position, E4, D5);
        assert_eq!(see(&position, m), PIECE_VALUES[PAWN]);
    }
}
