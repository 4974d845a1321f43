//! The command surface named in ¤6: a `Command` enum, its string
//! parser, and a pure-ish dispatch function over `Engine`. The actual
//! stdio loop and process exit are left to `main.rs`.
//!
//! Grounded in the teacher lineage's own protocol front-end (a
//! `lazy_static` regex per command family, captured then matched on
//! keyword) generalised from UCI's fixed vocabulary to the xboard-style
//! command names ¤6 lists.

use std::time::Duration;

use log::warn;
use regex::Regex;

use crate::book::PolyglotEntry;
use crate::engine::Engine;
use crate::errors::{EngineError, EngineResult};
use crate::notation;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetBoard(String),
    New,
    Go,
    Analyze,
    Stop,
    SetDepth(u8),
    SetTime(u32),
    SetOTim(u32),
    SetLevel { mps: u32, base: u32, inc: u32 },
    PlayMove(String),
    Undo,
    Redo,
    Ping(String),
    Eval,
    Perft(u8),
    Divide(u8),
    SetOption { name: String, value: String },
    Quit,
}

/// A response to a dispatched command, printed verbatim by the front
/// end (one line per `String` payload, the convention the original
/// text protocol uses).
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Pong(String),
    Eval(String),
    PerftResult(u64),
    DivideResult(Vec<(String, u64)>),
    Info(String),
}

/// Parses one input line into a `Command`. Unknown leading words are
/// rejected with `EngineError::ProtocolViolation` rather than
/// `InvalidMoveString` -- a command name typo is a protocol-level
/// mistake, not a move-string one.
pub fn parse_command(line: &str) -> EngineResult<Command> {
    lazy_static! {
        static ref WORDS: Regex = Regex::new(r"\S+").unwrap();
        static ref COORD_MOVE: Regex = Regex::new(r"^[a-h][1-8][a-h][1-8][qrbn]?$").unwrap();
    }
    let mut words = WORDS.find_iter(line).map(|m| m.as_str());
    let head = words.next().ok_or_else(|| EngineError::ProtocolViolation("empty command".to_string()))?;
    let rest: Vec<&str> = words.collect();

    match head {
        "setboard" => {
            if rest.is_empty() {
                return Err(EngineError::InvalidFen("setboard: missing FEN".to_string()));
            }
            Ok(Command::SetBoard(rest.join(" ")))
        }
        "new" => Ok(Command::New),
        "go" | "search" => Ok(Command::Go),
        "analyze" | "analyse" => Ok(Command::Analyze),
        "stop" | "move_now" => Ok(Command::Stop),
        "sd" => Ok(Command::SetDepth(parse_arg(&rest, "sd")?)),
        "st" => Ok(Command::SetTime(parse_arg(&rest, "st")?)),
        "time" => Ok(Command::SetTime(parse_arg(&rest, "time")?)),
        "otim" => Ok(Command::SetOTim(parse_arg(&rest, "otim")?)),
        "level" => {
            if rest.len() != 3 {
                return Err(EngineError::OutOfRange { what: "level", value: rest.len() as i64 });
            }
            Ok(Command::SetLevel {
                mps: parse_one(rest[0], "level")?,
                base: parse_one(rest[1], "level")?,
                inc: parse_one(rest[2], "level")?,
            })
        }
        "undo" => Ok(Command::Undo),
        "redo" => Ok(Command::Redo),
        "ping" => Ok(Command::Ping(rest.first().unwrap_or(&"").to_string())),
        "eval" => Ok(Command::Eval),
        "perft" => Ok(Command::Perft(parse_arg(&rest, "perft")?)),
        "divide" => Ok(Command::Divide(parse_arg(&rest, "divide")?)),
        "setoption" => {
            if rest.len() < 2 {
                return Err(EngineError::ProtocolViolation("setoption: missing name/value".to_string()));
            }
            Ok(Command::SetOption { name: rest[0].to_string(), value: rest[1..].join(" ") })
        }
        "quit" | "exit" => Ok(Command::Quit),
        _ if COORD_MOVE.is_match(head) => Ok(Command::PlayMove(head.to_string())),
        _ => Err(EngineError::ProtocolViolation(format!("unknown command: {}", head))),
    }
}

fn parse_one<T: std::str::FromStr>(s: &str, what: &'static str) -> EngineResult<T> {
    s.parse().map_err(|_| EngineError::OutOfRange { what, value: 0 })
}

fn parse_arg<T: std::str::FromStr>(rest: &[&str], what: &'static str) -> EngineResult<T> {
    let s = rest.first().ok_or(EngineError::OutOfRange { what, value: 0 })?;
    parse_one(s, what)
}

/// Applies `command` to `engine`. Local in the error-handling sense of
/// ¤7: invalid input is reported back as a `Response`-less `Err`
/// without mutating anything the command didn't own.
pub fn apply(engine: &mut Engine, command: Command) -> EngineResult<Response> {
    let result = apply_inner(engine, command);
    if let Err(ref e) = result {
        warn!("command rejected: {}", e);
    }
    result
}

fn apply_inner(engine: &mut Engine, command: Command) -> EngineResult<Response> {
    match command {
        Command::SetBoard(fen) => {
            engine.set_position_from_fen(&fen)?;
            Ok(Response::Ok)
        }
        Command::New => {
            engine.new_game();
            Ok(Response::Ok)
        }
        Command::Go | Command::Analyze => {
            if let Some(book_move) = engine.book_move() {
                engine.play_move(&book_move)?;
                return Ok(Response::Info(format!("book move {}", book_move)));
            }
            engine.go(engine_default_depth(), None)?;
            Ok(Response::Ok)
        }
        Command::Stop => {
            engine.stop();
            Ok(Response::Ok)
        }
        Command::SetDepth(depth) => {
            engine.go(depth, None)?;
            Ok(Response::Ok)
        }
        Command::SetTime(centiseconds) => {
            engine.go(engine_default_depth(), Some(Duration::from_millis(centiseconds as u64 * 10)))?;
            Ok(Response::Ok)
        }
        Command::SetOTim(_) => Ok(Response::Ok),
        Command::SetLevel { .. } => Ok(Response::Ok),
        Command::PlayMove(move_str) => {
            engine.play_move(&move_str)?;
            Ok(Response::Ok)
        }
        Command::Undo => {
            engine.undo()?;
            Ok(Response::Ok)
        }
        Command::Redo => {
            engine.redo()?;
            Ok(Response::Ok)
        }
        Command::Ping(token) => Ok(Response::Pong(token)),
        Command::Eval => Ok(Response::Eval(engine.static_eval().to_string())),
        Command::Perft(depth) => Ok(Response::PerftResult(engine.perft(depth))),
        Command::Divide(depth) => Ok(Response::DivideResult(engine.divide(depth))),
        Command::SetOption { name, value } => {
            engine.set_option(&name, &value)?;
            Ok(Response::Ok)
        }
        Command::Quit => Ok(Response::Ok),
    }
}

/// Depth used for `go`/`analyze` when the caller has not set an
/// explicit depth or clock; deep enough to be useful, shallow enough
/// not to hang a REPL session.
fn engine_default_depth() -> u8 {
    6
}

/// Loads Polyglot book entries from a pre-read buffer of 16-byte
/// records -- no file I/O here, per ¤6; the front end owns reading the
/// bytes.
pub fn load_polyglot_book(bytes: &[u8]) -> EngineResult<Vec<PolyglotEntry>> {
    if bytes.len() % 16 != 0 {
        return Err(EngineError::ProtocolViolation("polyglot book size is not a multiple of 16".to_string()));
    }
    let mut entries: Vec<PolyglotEntry> = bytes
        .chunks_exact(16)
        .map(|chunk| PolyglotEntry::from_bytes(chunk.try_into().unwrap()))
        .collect();
    entries.sort_by_key(|e| e.key);
    Ok(entries)
}

/// Resolves a SAN or coordinate move string against the engine's
/// current position, for front ends that want to echo a move before
/// playing it.
pub fn describe_move(engine: &Engine, move_str: &str) -> EngineResult<String> {
    if let Ok(m) = notation::parse_coordinate_move(engine.position(), move_str) {
        return Ok(notation::move_to_san(engine.position(), m));
    }
    let m = notation::parse_san_move(engine.position(), move_str)?;
    Ok(notation::move_to_coordinate_string(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;

    #[test]
    fn parses_setboard_with_a_full_fen() {
        let cmd = parse_command("setboard 8/8/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        assert_eq!(cmd, Command::SetBoard("8/8/8/8/8/8/8/4K2k w - - 0 1".to_string()));
    }

    #[test]
    fn parses_bare_coordinate_move_as_a_play_command() {
        assert_eq!(parse_command("e2e4").unwrap(), Command::PlayMove("e2e4".to_string()));
        assert_eq!(parse_command("a7a8q").unwrap(), Command::PlayMove("a7a8q".to_string()));
    }

    #[test]
    fn parses_level_with_three_numeric_arguments() {
        let cmd = parse_command("level 40 5 0").unwrap();
        assert_eq!(cmd, Command::SetLevel { mps: 40, base: 5, inc: 0 });
    }

    #[test]
    fn rejects_an_unknown_command() {
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn ping_round_trips_its_token() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        let response = apply(&mut engine, Command::Ping("7".to_string())).unwrap();
        assert_eq!(response, Response::Pong("7".to_string()));
    }

    #[test]
    fn perft_dispatch_matches_the_direct_call() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        let response = apply(&mut engine, Command::Perft(2)).unwrap();
        assert_eq!(response, Response::PerftResult(400));
    }

    #[test]
    fn setboard_then_play_move_updates_the_position() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        apply(&mut engine, Command::PlayMove("e2e4".to_string())).unwrap();
        assert_eq!(engine.position().to_move(), crate::basetypes::BLACK);
    }
}
