//! The core/front-end seam: ties the position, transposition table,
//! and search thread together behind a small synchronous surface a
//! command loop can drive, without that loop knowing how searching is
//! threaded underneath.
//!
//! Grounded in the teacher lineage's `engine::threading::run` command
//! loop shape, rebuilt around this crate's `search::Command`/`Report`
//! pair and simplified to the two-thread model of ¤5: one long-lived
//! searcher thread owned by `Engine`, and an optional `Timer` started
//! per search.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::book::{polyglot_best_move, PolyglotEntry};
use crate::errors::{EngineError, EngineResult};
use crate::eval;
use crate::notation;
use crate::options::{EngineOptions, SetOption};
use crate::position::Position;
use crate::search::{self, Command, Iteration, Report};
use crate::tt::TranspositionTable;

/// Per-game state outside a single position: the move list played so
/// far, for `undo`/`redo`.
struct GameHistory {
    played: Vec<Position>,
    undone: Vec<Position>,
}

impl GameHistory {
    fn new() -> GameHistory {
        GameHistory { played: Vec::new(), undone: Vec::new() }
    }

    fn record(&mut self, previous: Position) {
        self.played.push(previous);
        self.undone.clear();
    }

    fn undo(&mut self, current: Position) -> Option<Position> {
        let previous = self.played.pop()?;
        self.undone.push(current);
        Some(previous)
    }

    fn redo(&mut self, current: Position) -> Option<Position> {
        let next = self.undone.pop()?;
        self.played.push(current);
        Some(next)
    }
}

/// The engine's whole in-process state: the current position, its
/// game history, the transposition table, tunables, and the
/// searcher-thread handle.
pub struct Engine {
    position: Position,
    history: GameHistory,
    options: EngineOptions,
    tt: Arc<TranspositionTable>,
    cancel: Arc<AtomicBool>,
    commands: mpsc::Sender<Command>,
    reports: mpsc::Receiver<Report>,
    searcher_thread: Option<thread::JoinHandle<()>>,
    timer: Option<search::Timer>,
    searching: bool,
    book: Vec<PolyglotEntry>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> EngineResult<Engine> {
        let tt = Arc::new(TranspositionTable::new(options.hash_bits));
        let cancel = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();

        let thread_tt = Arc::clone(&tt);
        let thread_cancel = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name("searcher".to_string())
            .spawn(move || search::run_searcher(thread_tt, thread_cancel, command_rx, report_tx))
            .map_err(|e| EngineError::ResourceExhausted(e.to_string()))?;

        Ok(Engine {
            position: Position::start(),
            history: GameHistory::new(),
            options,
            tt,
            cancel,
            commands: command_tx,
            reports: report_rx,
            searcher_thread: Some(handle),
            timer: None,
            searching: false,
            book: Vec::new(),
        })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn set_book(&mut self, entries: Vec<PolyglotEntry>) {
        self.book = entries;
    }

    /// Replaces the root position and clears per-game history. Fails
    /// if search is in progress.
    pub fn set_position_from_fen(&mut self, fen: &str) -> EngineResult<()> {
        if self.searching {
            return Err(EngineError::ProtocolViolation("setboard while searching".to_string()));
        }
        self.position = Position::from_fen(fen)?;
        self.history = GameHistory::new();
        Ok(())
    }

    /// Restores the initial position and clears per-game state and the
    /// transposition table, the way a new game should.
    pub fn new_game(&mut self) {
        self.position = Position::start();
        self.history = GameHistory::new();
        self.tt.clear();
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> EngineResult<()> {
        self.options.set_option(name, value)
    }

    /// Plays `move_str` (coordinate notation) on the current position.
    pub fn play_move(&mut self, move_str: &str) -> EngineResult<()> {
        if self.searching {
            return Err(EngineError::ProtocolViolation("move while searching".to_string()));
        }
        let m = notation::parse_coordinate_move(&self.position, move_str)?;
        let next = self
            .position
            .make_move(m)
            .ok_or_else(|| EngineError::InvalidMoveString(move_str.to_string()))?;
        let previous = std::mem::replace(&mut self.position, next);
        self.history.record(previous);
        Ok(())
    }

    pub fn undo(&mut self) -> EngineResult<()> {
        if self.searching {
            return Err(EngineError::ProtocolViolation("undo while searching".to_string()));
        }
        match self.history.undo(self.position.clone()) {
            Some(previous) => {
                self.position = previous;
                Ok(())
            }
            None => Err(EngineError::ProtocolViolation("nothing to undo".to_string())),
        }
    }

    pub fn redo(&mut self) -> EngineResult<()> {
        if self.searching {
            return Err(EngineError::ProtocolViolation("redo while searching".to_string()));
        }
        match self.history.redo(self.position.clone()) {
            Some(next) => {
                self.position = next;
                Ok(())
            }
            None => Err(EngineError::ProtocolViolation("nothing to redo".to_string())),
        }
    }

    /// Looks up the current position in the loaded opening book.
    pub fn book_move(&self) -> Option<String> {
        polyglot_best_move(&self.position, &self.book).map(notation::move_to_coordinate_string)
    }

    /// Starts a search to `depth`, optionally bounded by `time_limit`.
    /// Returns immediately; iterations and the final result arrive
    /// through `poll_reports`.
    pub fn go(&mut self, depth: u8, time_limit: Option<Duration>) -> EngineResult<()> {
        if self.searching {
            return Err(EngineError::ProtocolViolation("go while already searching".to_string()));
        }
        self.cancel.store(false, Ordering::Relaxed);
        self.commands
            .send(Command::Search { position: self.position.clone(), depth, options: self.options })
            .map_err(|_| EngineError::ResourceExhausted("searcher thread is gone".to_string()))?;
        self.timer = time_limit.map(|d| search::Timer::start(Arc::clone(&self.cancel), d));
        self.searching = true;
        Ok(())
    }

    /// Requests cancellation; the searcher reports its last completed
    /// iteration through `poll_reports` as usual.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Drains any reports currently queued from the searcher thread
    /// without blocking. The caller is expected to call this
    /// periodically from the command loop (¤5: suspension only at node
    /// entry, so the engine never blocks waiting for a reply).
    pub fn poll_reports(&mut self) -> Vec<Report> {
        let mut reports = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            let done = matches!(report, Report::Done(_));
            reports.push(report);
            if done {
                self.searching = false;
                if let Some(timer) = self.timer.take() {
                    timer.cancel();
                }
            }
        }
        reports
    }

    /// A static evaluation of the current position, from the side to
    /// move's perspective, printed for the `eval` command.
    pub fn static_eval(&self) -> eval::Value {
        eval::eval(&self.position)
    }

    /// Counts leaf nodes at `depth` plies, for the `perft` command.
    pub fn perft(&self, depth: u8) -> u64 {
        perft(&self.position, depth)
    }

    /// Move-by-move leaf counts at `depth` plies from the current
    /// position, for the `divide` command.
    pub fn divide(&self, depth: u8) -> Vec<(String, u64)> {
        use crate::moves::MoveStack;
        let mut stack = MoveStack::new();
        stack.save();
        self.position.generate_moves(false, &mut stack);
        let moves: Vec<_> = stack.current_slice().to_vec();
        stack.restore();

        let mut out = Vec::new();
        for m in moves {
            if let Some(child) = self.position.make_move(m) {
                let count = if depth == 0 { 1 } else { perft(&child, depth - 1) };
                out.push((notation::move_to_coordinate_string(m), count));
            }
        }
        out
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.commands.send(Command::Exit).ok();
        if let Some(handle) = self.searcher_thread.take() {
            handle.join().ok();
        }
    }
}

fn perft(position: &Position, depth: u8) -> u64 {
    use crate::moves::MoveStack;

    if depth == 0 {
        return 1;
    }
    let mut stack = MoveStack::new();
    stack.save();
    position.generate_moves(false, &mut stack);
    let moves: Vec<_> = stack.current_slice().to_vec();
    stack.restore();

    let mut count = 0;
    for m in moves {
        if let Some(child) = position.make_move(m) {
            count += perft(&child, depth - 1);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perft_matches_published_counts_from_the_initial_position() {
        assert_eq!(perft(&Position::start(), 1), 20);
        assert_eq!(perft(&Position::start(), 2), 400);
        assert_eq!(perft(&Position::start(), 3), 8_902);
    }

    #[test]
    fn perft_matches_kiwipete_at_depth_one() {
        let position =
            Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(perft(&position, 1), 48);
    }

    #[test]
    fn undo_restores_the_position_before_the_move() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        let before = engine.position().to_fen();
        engine.play_move("e2e4").unwrap();
        assert_ne!(engine.position().to_fen(), before);
        engine.undo().unwrap();
        assert_eq!(engine.position().to_fen(), before);
    }

    #[test]
    fn redo_replays_an_undone_move() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        engine.play_move("e2e4").unwrap();
        let after = engine.position().to_fen();
        engine.undo().unwrap();
        engine.redo().unwrap();
        assert_eq!(engine.position().to_fen(), after);
    }

    #[test]
    fn setboard_is_rejected_while_searching() {
        let mut engine = Engine::new(EngineOptions::default()).unwrap();
        engine.go(1, None).unwrap();
        assert!(engine.set_position_from_fen("8/8/8/8/8/8/8/4K2k w - - 0 1").is_err());
    }
}
