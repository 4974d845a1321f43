//! The engine's small, pre-search configuration surface.
//!
//! Grounded in the teacher's own `SetOption` trait: components that
//! have tunables implement `SetOption` so the command layer can push a
//! named value down to whichever component owns it, without knowing
//! its internal representation.

use crate::errors::{EngineError, EngineResult};

/// A component that exposes named, string-valued options.
pub trait SetOption {
    /// Returns the list of option names this component accepts.
    fn options() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// Sets a named option. Implementations reject unknown names and
    /// out-of-range values via `EngineError`.
    fn set_option(&mut self, _name: &str, _value: &str) -> EngineResult<()> {
        Ok(())
    }
}

/// Engine-wide tunables, set once before a search starts.
///
/// Defaults are conservative but non-zero: the reduction factors that
/// the original implementation zeroed out at start-up are treated here
/// as a latent initialization bug rather than a tuning target, per the
/// open question this behaviour raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// log2 of the number of buckets in the transposition table.
    pub hash_bits: u32,
    /// Null-move reduction, in whole plies.
    pub null_move_reduction: u8,
    /// Late-move reduction, in whole plies.
    pub lmr_reduction: u8,
    /// Move index (1-based, after hash/tactical/killer phases) beyond
    /// which late-move reduction starts to apply.
    pub lmr_full_depth_moves: u8,
    /// When set, repetitions and GHI barriers are tracked strictly
    /// (analyse mode); otherwise only move hints are trusted from the
    /// transposition table away from barriers.
    pub strict_repetition: bool,
    /// When set, a check at depth > 0 extends the node's depth by one
    /// ply.
    pub check_extension: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            hash_bits: 20, // 2^20 buckets
            null_move_reduction: 2,
            lmr_reduction: 1,
            lmr_full_depth_moves: 3,
            strict_repetition: false,
            check_extension: true,
        }
    }
}

impl SetOption for EngineOptions {
    fn options() -> Vec<(&'static str, &'static str)> {
        vec![
            ("hash_bits", "log2 number of transposition table buckets"),
            ("null_move_reduction", "plies reduced for null-move pruning"),
            ("lmr_reduction", "plies reduced for late-move reduction"),
            ("strict_repetition", "true/false: enable strict GHI/repetition mode"),
            ("check_extension", "true/false: extend depth when in check"),
        ]
    }

    fn set_option(&mut self, name: &str, value: &str) -> EngineResult<()> {
        match name {
            "hash_bits" => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| EngineError::OutOfRange { what: "hash_bits", value: 0 })?;
                if !(10..=30).contains(&n) {
                    return Err(EngineError::OutOfRange { what: "hash_bits", value: n as i64 });
                }
                self.hash_bits = n;
            }
            "null_move_reduction" => {
                self.null_move_reduction = value
                    .parse()
                    .map_err(|_| EngineError::OutOfRange { what: "null_move_reduction", value: 0 })?;
            }
            "lmr_reduction" => {
                self.lmr_reduction = value
                    .parse()
                    .map_err(|_| EngineError::OutOfRange { what: "lmr_reduction", value: 0 })?;
            }
            "strict_repetition" => {
                self.strict_repetition = value == "true";
            }
            "check_extension" => {
                self.check_extension = value == "true";
            }
            _ => {
                return Err(EngineError::ProtocolViolation(format!("unknown option: {}", name)));
            }
        }
        Ok(())
    }
}
