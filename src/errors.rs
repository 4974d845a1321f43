//! Error types returned at the engine's boundaries.
//!
//! Search and evaluation code never fails -- it only ever returns a
//! `Value`. Only the parsing and command-dispatch layers that sit at the
//! edge of the core can fail, and they do so through `EngineError`.

use std::fmt;
use thiserror::Error;

/// The engine's error taxonomy.
///
/// Variants correspond to kinds of failure, not to individual call
/// sites: several parsing functions may all return `InvalidFen`, for
/// instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A FEN string does not describe a legal position.
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    /// A move string could not be resolved against the current legal
    /// move set.
    #[error("invalid move: {0}")]
    InvalidMoveString(String),

    /// A command argument was syntactically valid but out of the
    /// accepted range.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },

    /// A command was issued while the engine was in a state that does
    /// not accept it (e.g. `setboard` while searching). Not fatal --
    /// callers should log a warning and otherwise ignore it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A resource could not be allocated (the transposition table, at
    /// start-up). Fatal: the process should exit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// A usage-hint wrapper the command dispatcher prints alongside a
/// rejected command, per the "structured exit path" error policy.
#[derive(Debug, Clone)]
pub struct UsageError {
    pub command: &'static str,
    pub usage: &'static str,
    pub source: EngineError,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\nusage: {}", self.source, self.usage)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
