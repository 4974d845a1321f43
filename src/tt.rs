//! The transposition table: a fixed-size array of buckets, each with
//! a depth-preferring *main* slot and an always-replace *aux* slot.
//!
//! The packed 64-bit entry layout is carried over bit-for-bit from the
//! original engine's `ht_entry` (`hash.h`): a move hint, a depth, a
//! value type, and a biased value, packed from the low bit upward.
//! The lockless concurrent read/write discipline -- storing the key
//! XOR-ed with the data word, so a probe that lands on a torn write
//! self-detects as a miss -- is the Rust lineage's `StdHashTable`
//! technique, reexpressed with `AtomicU64` in place of the teacher's
//! `UnsafeCell` so it is actually sound to share across searcher
//! threads.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

pub const VALUE_TYPE_NONE: u8 = 0;
pub const VALUE_TYPE_UPPER: u8 = 1;
pub const VALUE_TYPE_LOWER: u8 = 2;
pub const VALUE_TYPE_EXACT: u8 = 3;

/// The move hint is a 15-bit packed digest (`Move::digest`, orig|dest
/// <<6|promo<<12), not the 7-bit move-list index the original hash
/// table packs: a list index is only meaningful within the node that
/// produced it, and an entry here gets read back by unrelated nodes at
/// an arbitrary later point, so it has to carry a self-contained move
/// rather than a position into a list that no longer exists.
const NO_MOVE: u16 = 0x7fff;
const VALUE_BIAS: i32 = 0x800;

const S_MOVE: u64 = 0;
const S_DEPTH: u64 = 15;
const S_VALUE_TYPE: u64 = 23;
const S_VALUE: u64 = 25;

const MASK_MOVE: u64 = 0x7fff;
const MASK_DEPTH: u64 = 0xff;
const MASK_VALUE_TYPE: u64 = 0b11;
const MASK_VALUE: u64 = 0xfff;

/// One decoded transposition-table record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub move_digest: Option<u16>,
    pub depth: u8,
    pub value_type: u8,
    pub value: i32,
}

impl Entry {
    pub fn new(move_digest: Option<u16>, depth: u8, value_type: u8, value: i32) -> Entry {
        debug_assert!(value >= -VALUE_BIAS && value < VALUE_BIAS);
        debug_assert!(value_type <= 3);
        Entry { move_digest, depth, value_type, value }
    }

    fn pack(self) -> u64 {
        let move_bits = self.move_digest.unwrap_or(NO_MOVE) as u64;
        let value_bits = (self.value + VALUE_BIAS) as u64;
        (move_bits & MASK_MOVE) << S_MOVE
            | (self.depth as u64 & MASK_DEPTH) << S_DEPTH
            | (self.value_type as u64 & MASK_VALUE_TYPE) << S_VALUE_TYPE
            | (value_bits & MASK_VALUE) << S_VALUE
    }

    fn unpack(bits: u64) -> Entry {
        let move_bits = ((bits >> S_MOVE) & MASK_MOVE) as u16;
        let depth = ((bits >> S_DEPTH) & MASK_DEPTH) as u8;
        let value_type = ((bits >> S_VALUE_TYPE) & MASK_VALUE_TYPE) as u8;
        let value = ((bits >> S_VALUE) & MASK_VALUE) as i32 - VALUE_BIAS;
        Entry {
            move_digest: if move_bits == NO_MOVE { None } else { Some(move_bits) },
            depth,
            value_type,
            value,
        }
    }
}

struct Slot {
    key_xor_data: AtomicU64,
    data: AtomicU64,
}

impl Default for Slot {
    fn default() -> Slot {
        Slot { key_xor_data: AtomicU64::new(0), data: AtomicU64::new(0) }
    }
}

impl Slot {
    fn load(&self, key: u64) -> Option<Entry> {
        let data = self.data.load(Ordering::Acquire);
        let key_xor_data = self.key_xor_data.load(Ordering::Acquire);
        if data == 0 || key_xor_data ^ data != key {
            return None;
        }
        Some(Entry::unpack(data))
    }

    fn store(&self, key: u64, entry: Entry) {
        let data = entry.pack();
        self.data.store(data, Ordering::Release);
        self.key_xor_data.store(key ^ data, Ordering::Release);
    }

}

#[derive(Default)]
struct Bucket {
    main: Slot,
    aux: Slot,
}

/// A concurrent, fixed-size transposition table with `2^k` buckets.
pub struct TranspositionTable {
    mask: u64,
    buckets: Vec<Bucket>,
}

impl TranspositionTable {
    /// Creates a table with `2^hash_bits` buckets.
    pub fn new(hash_bits: u32) -> TranspositionTable {
        let count = 1usize << hash_bits;
        let mut buckets = Vec::with_capacity(count);
        buckets.resize_with(count, Default::default);
        debug!("transposition table sized to {} buckets (2^{})", count, hash_bits);
        TranspositionTable { mask: (count - 1) as u64, buckets }
    }

    #[inline]
    fn bucket(&self, key: u64) -> &Bucket {
        &self.buckets[(key & self.mask) as usize]
    }

    /// Looks up `key`, preferring the main slot.
    pub fn probe(&self, key: u64) -> Option<Entry> {
        let bucket = self.bucket(key);
        bucket.main.load(key).or_else(|| bucket.aux.load(key))
    }

    /// Inserts `entry` for `key`, per the replacement policy in ¤4.4:
    /// shallower incoming depth goes to aux; equal depth keeps the
    /// stricter value type; otherwise the main slot is overwritten and
    /// its previous occupant demoted to aux.
    pub fn insert(&self, key: u64, entry: Entry) {
        let bucket = self.bucket(key);
        let main_occupied_by_us = bucket.main.load(key);

        match main_occupied_by_us {
            Some(existing) if existing.depth > entry.depth => {
                bucket.aux.store(key, entry);
            }
            Some(existing) if existing.depth == entry.depth => {
                if stricter_or_equal(entry.value_type, existing.value_type) {
                    let merged = Entry {
                        move_digest: entry.move_digest.or(existing.move_digest),
                        ..entry
                    };
                    bucket.main.store(key, merged);
                } else {
                    bucket.aux.store(key, entry);
                }
            }
            _ => {
                let displaced_data = bucket.main.data.load(Ordering::Relaxed);
                if displaced_data != 0 {
                    let displaced_key = displaced_data ^ bucket.main.key_xor_data.load(Ordering::Relaxed);
                    bucket.aux.store(displaced_key, Entry::unpack(displaced_data));
                }
                bucket.main.store(key, entry);
            }
        }
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            bucket.main.data.store(0, Ordering::Relaxed);
            bucket.main.key_xor_data.store(0, Ordering::Relaxed);
            bucket.aux.data.store(0, Ordering::Relaxed);
            bucket.aux.key_xor_data.store(0, Ordering::Relaxed);
        }
    }

    /// Moves every bucket's main slot into its aux slot and clears
    /// main, without touching what was already in aux. Called between
    /// depth iterations in competitive mode, so the previous
    /// iteration's best entries survive one more iteration as aux
    /// fallbacks instead of being wiped outright.
    pub fn swap(&self) {
        for bucket in &self.buckets {
            let data = bucket.main.data.load(Ordering::Relaxed);
            let key_xor_data = bucket.main.key_xor_data.load(Ordering::Relaxed);
            bucket.aux.data.store(data, Ordering::Relaxed);
            bucket.aux.key_xor_data.store(key_xor_data, Ordering::Relaxed);
            bucket.main.data.store(0, Ordering::Relaxed);
            bucket.main.key_xor_data.store(0, Ordering::Relaxed);
        }
        debug!("transposition table swapped main into aux");
    }
}

/// Exact beats a bound of either polarity; a bound beats no value.
fn stricter_or_equal(incoming: u8, existing: u8) -> bool {
    rank(incoming) >= rank(existing)
}

fn rank(value_type: u8) -> u8 {
    match value_type {
        VALUE_TYPE_EXACT => 3,
        VALUE_TYPE_UPPER | VALUE_TYPE_LOWER => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let entry = Entry::new(Some(0x1234), 17, VALUE_TYPE_EXACT, -500);
        let bits = entry.pack();
        assert_eq!(Entry::unpack(bits), entry);
    }

    #[test]
    fn store_and_probe() {
        let tt = TranspositionTable::new(10);
        let entry = Entry::new(Some(42), 5, VALUE_TYPE_LOWER, 100);
        tt.insert(123, entry);
        assert_eq!(tt.probe(123), Some(entry));
        assert_eq!(tt.probe(124), None);
    }

    #[test]
    fn deeper_search_overwrites_main_and_demotes_old_entry() {
        let tt = TranspositionTable::new(10);
        let key = 7u64;
        tt.insert(key, Entry::new(None, 3, VALUE_TYPE_LOWER, 10));
        tt.insert(key, Entry::new(None, 8, VALUE_TYPE_EXACT, 20));
        let probed = tt.probe(key).unwrap();
        assert_eq!(probed.depth, 8);
        assert_eq!(probed.value, 20);
    }

    #[test]
    fn swap_moves_main_into_aux_and_clears_main() {
        let tt = TranspositionTable::new(10);
        let key = 7u64;
        tt.insert(key, Entry::new(Some(42), 5, VALUE_TYPE_EXACT, 100));
        tt.swap();
        let bucket = tt.bucket(key);
        assert_eq!(bucket.main.load(key), None);
        assert_eq!(bucket.aux.load(key), Some(Entry::new(Some(42), 5, VALUE_TYPE_EXACT, 100)));
        assert_eq!(tt.probe(key), Some(Entry::new(Some(42), 5, VALUE_TYPE_EXACT, 100)));
    }

    #[test]
    fn shallower_search_goes_to_aux_not_main() {
        let tt = TranspositionTable::new(10);
        let key = 7u64;
        tt.insert(key, Entry::new(None, 8, VALUE_TYPE_EXACT, 20));
        tt.insert(key, Entry::new(None, 2, VALUE_TYPE_LOWER, 1));
        let probed = tt.probe(key).unwrap();
        assert_eq!(probed.depth, 8);
    }
}
