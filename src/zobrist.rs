//! Zobrist hashing, stored as a flipped pair `(h, h')` so that
//! swapping sides is a cheap pair swap instead of a full recompute.
//!
//! Grounded directly in the layout of the original engine's
//! `zhash`/`zhash_pair`: a single random table is shared by both
//! halves of the pair, but the flipped half is indexed by the
//! opposite color and the vertically mirrored square, so toggling one
//! piece updates both halves from the same table in lockstep.

use crate::basetypes::*;
use crate::castling;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Mirrors a square vertically (rank `r` <-> rank `7-r`).
#[inline(always)]
pub fn mirror_square(sq: Square) -> Square {
    sq ^ 56
}

#[inline(always)]
fn opponent(color: Color) -> Color {
    1 ^ color
}

/// The random tables backing Zobrist hashing. Built once from a fixed
/// seed, so that `zobrist(p)` is reproducible across runs (required by
/// the determinism property).
pub struct ZobristArrays {
    pieces: [[[u64; 64]; 6]; 2],
    castling: [u64; 16],
    en_passant: [u64; 8],
    to_move: u64,
}

impl ZobristArrays {
    fn build() -> ZobristArrays {
        let mut rng = StdRng::seed_from_u64(0x5a6f_6272_6973_7421); // "Zobrist!" in hex-ish seed
        let mut pieces = [[[0u64; 64]; 6]; 2];
        for color in 0..2 {
            for piece in 0..6 {
                for sq in 0..64 {
                    pieces[color][piece][sq] = rng.gen();
                }
            }
        }
        let mut castling = [0u64; 16];
        for entry in castling.iter_mut() {
            *entry = rng.gen();
        }
        let mut en_passant = [0u64; 8];
        for entry in en_passant.iter_mut() {
            *entry = rng.gen();
        }
        ZobristArrays { pieces, castling, en_passant, to_move: rng.gen() }
    }

    pub fn get() -> &'static ZobristArrays {
        &ZOBRIST
    }
}

lazy_static! {
    static ref ZOBRIST: ZobristArrays = ZobristArrays::build();
}

/// A pair `(h, h')` where `h'` is the hash of the vertically-flipped,
/// side-swapped position. Flipping the position is `pair.flip()`,
/// which just swaps the two halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZobristPair {
    value: [u64; 2],
}

impl ZobristPair {
    pub fn zero() -> Self {
        ZobristPair { value: [0, 0] }
    }

    /// The hash of the position as stored (not flipped).
    #[inline(always)]
    pub fn key(self) -> u64 {
        self.value[0]
    }

    /// Swaps the two halves: the hash of the vertically-flipped
    /// position becomes the primary key.
    #[inline(always)]
    pub fn flip(self) -> Self {
        ZobristPair { value: [self.value[1], self.value[0]] }
    }

    #[inline(always)]
    pub fn toggle_piece(&mut self, color: Color, piece: PieceType, square: Square) {
        let z = ZobristArrays::get();
        self.value[0] ^= z.pieces[color][piece][square];
        self.value[1] ^= z.pieces[opponent(color)][piece][mirror_square(square)];
    }

    #[inline(always)]
    pub fn toggle_castling(&mut self, rights: castling::CastlingRights) {
        let z = ZobristArrays::get();
        // Castling rights flip white<->black alongside the board, so
        // the mirrored value uses the byte-swapped nibble (low 2 bits
        // <-> high 2 bits).
        let flipped_value = ((rights.value() & 0b11) << 2) | ((rights.value() & 0b1100) >> 2);
        self.value[0] ^= z.castling[rights.value()];
        self.value[1] ^= z.castling[flipped_value];
    }

    #[inline(always)]
    pub fn toggle_en_passant(&mut self, file: File) {
        let z = ZobristArrays::get();
        self.value[0] ^= z.en_passant[file];
        self.value[1] ^= z.en_passant[file];
    }

    #[inline(always)]
    pub fn toggle_side_to_move(&mut self) {
        let z = ZobristArrays::get();
        self.value[0] ^= z.to_move;
        self.value[1] ^= z.to_move;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basetypes::*;

    #[test]
    fn flip_is_involutive() {
        let mut p = ZobristPair::zero();
        p.toggle_piece(WHITE, PAWN, E2);
        p.toggle_piece(BLACK, KNIGHT, G8);
        let flipped_twice = p.flip().flip();
        assert_eq!(p, flipped_twice);
    }

    #[test]
    fn toggling_twice_is_identity() {
        let mut p = ZobristPair::zero();
        p.toggle_piece(WHITE, QUEEN, D1);
        p.toggle_piece(WHITE, QUEEN, D1);
        assert_eq!(p, ZobristPair::zero());
    }
}
