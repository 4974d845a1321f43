//! Iterative-deepening negamax search: principal-variation and
//! null-window descent, quiescence, check extension, null-move
//! pruning, late-move reduction, mate-distance scores, and cooperative
//! cancellation.
//!
//! The recursive shape -- hash move tried first, scout re-search once
//! alpha is raised, a transposition-table store at node exit -- carries
//! over the teacher lineage's `engine::search::Search::run`. It is
//! rebuilt around this crate's clone-on-`make_move` `Position`, which
//! makes undo unnecessary, and extended with the PV/cut/all node-kind
//! bookkeeping, null-move pruning and late-move reduction the node
//! design calls for. Iterative deepening and the searcher/timer split
//! follow the teacher's `engine::threading` master/slave channel shape,
//! simplified to the exactly-two-threads model (one searcher, one
//! optional timer) with an `AtomicBool` cancellation flag standing in
//! for the teacher's nested command-and-control threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, trace};

use crate::basetypes::*;
use crate::eval::{self, Value, VALUE_MAX, VALUE_MIN};
use crate::move_order::{HistoryTable, Killers, MoveOrderer, Phase};
use crate::moves::{Move, MoveStack};
use crate::options::EngineOptions;
use crate::position::Position;
use crate::see;
use crate::tt::{self, Entry, TranspositionTable};

/// Score for "checkmate delivered at this node"; mate scores are
/// `MATE - dist` (or its negation), so they sit just below `MATE` and
/// are distinguished from ordinary evaluations by `is_mate_score`.
pub const MATE: Value = VALUE_MAX;

/// A value of at least this magnitude is a mate score: a margin
/// comfortably above the largest material sum `eval` can return.
const MATE_BOUND: Value = MATE - 256;

pub fn is_mate_score(v: Value) -> bool {
    v.abs() >= MATE_BOUND
}

/// Moves a mate score one ply farther from the node it was computed
/// at, the way propagating a result up through one more level of
/// recursion always does: the mate is one move further away than it
/// looked from the child's point of view.
#[inline]
fn back_off_one_ply(v: Value) -> Value {
    if v > MATE_BOUND {
        v - 1
    } else if v < -MATE_BOUND {
        v + 1
    } else {
        v
    }
}

const MAX_PLY: usize = 64;
const NODE_CHECK_INTERVAL: u64 = 2048;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NodeKind {
    Pv,
    Cut,
    All,
}

/// A sequence of moves, most recently extracted from the hash table
/// along the principal variation of a completed iteration.
#[derive(Clone, Debug, Default)]
pub struct Pv {
    pub moves: Vec<Move>,
}

/// Reported to the observer callback after each completed
/// iterative-deepening iteration.
#[derive(Clone, Debug)]
pub struct Iteration {
    pub depth: u8,
    pub selective_depth: u8,
    pub value: Value,
    pub pv: Pv,
    pub nodes: u64,
}

/// Drives one negamax search from a root position. Holds the
/// per-search mutable state (history table, killer slots, ancestor
/// hash path, node counter) that would otherwise have to be threaded
/// through every recursive call.
pub struct Searcher<'a> {
    tt: &'a TranspositionTable,
    options: EngineOptions,
    cancel: &'a AtomicBool,
    history: HistoryTable,
    killers: Vec<Killers>,
    path: Vec<u64>,
    nodes: u64,
    selective_depth: u8,
    cancelled: bool,
}

impl<'a> Searcher<'a> {
    pub fn new(tt: &'a TranspositionTable, options: EngineOptions, cancel: &'a AtomicBool) -> Searcher<'a> {
        Searcher {
            tt,
            options,
            cancel,
            history: HistoryTable::new(),
            killers: vec![Killers::new(); MAX_PLY],
            path: Vec::with_capacity(MAX_PLY),
            nodes: 0,
            selective_depth: 0,
            cancelled: false,
        }
    }

    pub fn node_count(&self) -> u64 {
        self.nodes
    }

    /// Searches `root` to increasing whole-ply depths, up to
    /// `max_depth`, calling `on_iteration` after each one completes.
    /// Returns the last completed iteration (depth 0 with the static
    /// evaluation and an empty PV if cancelled before depth 1
    /// finished).
    pub fn iterative_deepening<F: FnMut(&Iteration)>(&mut self, root: &Position, max_depth: u8, mut on_iteration: F) -> Iteration {
        let mut best = Iteration {
            depth: 0,
            selective_depth: 0,
            value: eval::eval(root),
            pv: Pv::default(),
            nodes: 0,
        };

        self.path.clear();
        self.path.push(root.hash());

        for depth in 1..=max_depth {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            if depth > 1 && !self.options.strict_repetition {
                self.tt.swap();
            }
            self.selective_depth = depth;
            self.cancelled = false;
            let value = self.search(root, VALUE_MIN, VALUE_MAX, depth as i32, NodeKind::Pv, 0, true);
            if self.cancelled {
                break;
            }
            let pv = self.extract_pv(root, depth);
            best = Iteration {
                depth,
                selective_depth: self.selective_depth,
                value,
                pv,
                nodes: self.nodes,
            };
            info!("iteration done: depth={} score={} nodes={}", depth, value, self.nodes);
            on_iteration(&best);
            if is_mate_score(value) {
                break;
            }
        }
        best
    }

    /// Walks the hash-move chain from `root`, resolving each stored
    /// move digest back against a freshly generated move list.
    fn extract_pv(&self, root: &Position, max_len: u8) -> Pv {
        let mut moves = Vec::new();
        let mut position = root.clone();
        for _ in 0..max_len {
            let entry = match self.tt.probe(position.hash()) {
                Some(e) => e,
                None => break,
            };
            let digest = match entry.move_digest {
                Some(d) => d,
                None => break,
            };
            let m = match position.try_move_digest(digest) {
                Some(m) => m,
                None => break,
            };
            let child = match position.make_move(m) {
                Some(p) => p,
                None => break,
            };
            moves.push(m);
            position = child;
        }
        Pv { moves }
    }

    #[inline]
    fn should_stop(&self) -> bool {
        self.nodes % NODE_CHECK_INTERVAL == 0 && self.cancel.load(Ordering::Relaxed)
    }

    fn is_repetition(&self, hash: u64, halfmove_clock: u32) -> bool {
        let limit = (halfmove_clock as usize).min(self.path.len());
        self.path[self.path.len() - limit..].iter().any(|&h| h == hash)
    }

    fn has_non_pawn_material(&self, position: &Position) -> bool {
        let us = position.to_move();
        let occupied_by_us = position.color()[us];
        let pt = position.piece_type();
        (pt[QUEEN] | pt[ROOK] | pt[BISHOP] | pt[KNIGHT]) & occupied_by_us != 0
    }

    fn killers_at(&self, ply: usize) -> [Option<Move>; 2] {
        self.killers.get(ply).map(Killers::get).unwrap_or([None, None])
    }

    fn record_cutoff(&mut self, position: &Position, m: Move, depth: i32, ply: usize) {
        if m.captured_piece() == NO_PIECE && m.result_piece() == m.moved_piece() {
            self.history.record(position.to_move(), m.moved_piece(), m.dest_square(), depth.max(0) as u8);
            if let Some(slot) = self.killers.get_mut(ply) {
                slot.record(m);
            }
        }
    }

    /// The recursive negamax core. Returns a value from the point of
    /// view of `position.to_move()`. `barrier` marks a GHI barrier
    /// frame -- the root, or a node reached by an irreversible move
    /// (capture or pawn move, the same criterion that resets
    /// `halfmove_clock`) -- the only frames where a stored value is
    /// trusted across history that can't recur.
    fn search(
        &mut self,
        position: &Position,
        mut alpha: Value,
        beta: Value,
        mut depth: i32,
        mut kind: NodeKind,
        ply: usize,
        barrier: bool,
    ) -> Value {
        self.nodes += 1;
        if self.should_stop() {
            self.cancelled = true;
            return alpha;
        }

        if ply > 0 {
            if self.options.strict_repetition && self.is_repetition(position.hash(), position.halfmove_clock()) {
                return 0;
            }
            if position.is_insufficient_material() {
                return 0;
            }
        }

        let in_check = position.in_check();
        if self.options.check_extension && in_check && depth > 0 {
            depth += 1;
        }

        if depth <= 0 {
            return self.quiescence(position, alpha, beta, ply);
        }
        if ply >= MAX_PLY {
            return eval::eval(position);
        }

        let hash = position.hash();
        let tt_entry = self.tt.probe(hash);
        if let Some(entry) = tt_entry {
            if kind != NodeKind::Pv && entry.depth as i32 >= depth {
                let cutoff = match entry.value_type {
                    tt::VALUE_TYPE_EXACT => true,
                    tt::VALUE_TYPE_LOWER => entry.value >= beta,
                    tt::VALUE_TYPE_UPPER => entry.value <= alpha,
                    _ => false,
                };
                if cutoff {
                    return entry.value;
                }
            }
        }

        // Null-move pruning: only at cut-expected, non-check nodes
        // with material left to avoid zugzwang, and only when the
        // hash entry doesn't already say we can't reach beta anyway.
        if kind == NodeKind::Cut
            && !in_check
            && depth > self.options.null_move_reduction as i32
            && self.has_non_pawn_material(position)
            && !matches!(tt_entry, Some(e) if e.value_type == tt::VALUE_TYPE_UPPER && e.value < beta)
        {
            if let Some(null_child) = position.make_move(position.null_move()) {
                self.path.push(null_child.hash());
                let reduced = depth - 1 - self.options.null_move_reduction as i32;
                trace!("null-move try at ply={} depth={} reduced_to={}", ply, depth, reduced);
                let raw = self.search(&null_child, -beta, -beta + 1, reduced, NodeKind::All, ply + 1, false);
                self.path.pop();
                let value = back_off_one_ply(-raw);
                if value >= beta {
                    return beta;
                }
            }
        }

        let hash_move = tt_entry
            .and_then(|e| e.move_digest)
            .and_then(|d| position.try_move_digest(d));
        let mut orderer = MoveOrderer::new(position, hash_move, self.killers_at(ply));

        let original_alpha = alpha;
        let mut best_value = VALUE_MIN;
        let mut best_move = Move::null();
        let mut any_legal = false;
        let mut move_index = 0usize;

        loop {
            let phase_before = orderer.phase();
            let m = match orderer.next(&self.history) {
                Some(m) => m,
                None => break,
            };
            let child = match position.make_move(m) {
                Some(p) => p,
                None => continue,
            };
            any_legal = true;
            move_index += 1;
            let first_move = move_index == 1;

            let child_kind = if first_move {
                match kind {
                    NodeKind::Pv => NodeKind::Pv,
                    NodeKind::Cut => NodeKind::All,
                    NodeKind::All => NodeKind::Cut,
                }
            } else {
                NodeKind::Cut
            };

            let gives_check = child.in_check();
            let quiet = m.captured_piece() == NO_PIECE && m.result_piece() == m.moved_piece();
            let irreversible = m.captured_piece() != NO_PIECE || m.moved_piece() == PAWN;
            let past_killer_phase = phase_before == Phase::General || phase_before == Phase::LosingMoves;
            let reduction = if kind == NodeKind::All
                && !first_move
                && quiet
                && !in_check
                && !gives_check
                && past_killer_phase
                && depth > self.options.lmr_reduction as i32
                && move_index as u8 > self.options.lmr_full_depth_moves
            {
                trace!("lmr reduces move {} at ply={} depth={}", move_index, ply, depth);
                self.options.lmr_reduction as i32
            } else {
                0
            };

            self.path.push(child.hash());

            let value = if first_move {
                let raw = self.search(&child, -beta, -alpha, depth - 1, child_kind, ply + 1, irreversible);
                back_off_one_ply(-raw)
            } else {
                let probe_depth = depth - 1 - reduction;
                let raw = self.search(&child, -alpha - 1, -alpha, probe_depth, child_kind, ply + 1, irreversible);
                let mut v = back_off_one_ply(-raw);
                if reduction > 0 && v > alpha {
                    let raw = self.search(&child, -alpha - 1, -alpha, depth - 1, child_kind, ply + 1, irreversible);
                    v = back_off_one_ply(-raw);
                }
                if v > alpha && v < beta {
                    let raw = self.search(&child, -beta, -alpha, depth - 1, NodeKind::Pv, ply + 1, irreversible);
                    v = back_off_one_ply(-raw);
                }
                v
            };

            self.path.pop();

            if kind == NodeKind::Cut && !first_move && past_killer_phase && value <= alpha {
                kind = NodeKind::All;
            }

            if value > best_value {
                best_value = value;
                best_move = m;
            }
            if value > alpha {
                alpha = value;
            }
            if alpha >= beta {
                self.record_cutoff(position, m, depth, ply);
                break;
            }

            if self.cancelled {
                return alpha;
            }
        }

        if !any_legal {
            return if in_check { -MATE } else { 0 };
        }

        // Fail-soft: `best_value` is the true maximum found even when
        // it never raised `alpha`, and is what gets stored and
        // returned; `alpha`/`beta` only ever bounded the search.
        let value_type = if best_value >= beta {
            tt::VALUE_TYPE_LOWER
        } else if best_value > original_alpha {
            tt::VALUE_TYPE_EXACT
        } else {
            tt::VALUE_TYPE_UPPER
        };

        let digest = if best_move.is_null() { None } else { Some(best_move.digest()) };
        let stored = if self.options.strict_repetition && !barrier {
            Entry::new(digest, 0, tt::VALUE_TYPE_NONE, 0)
        } else {
            Entry::new(digest, depth.max(0) as u8, value_type, best_value)
        };
        self.tt.insert(hash, stored);

        best_value
    }

    fn quiescence(&mut self, position: &Position, mut alpha: Value, beta: Value, ply: usize) -> Value {
        self.nodes += 1;
        if self.should_stop() {
            self.cancelled = true;
            return alpha;
        }
        if ply as u8 > self.selective_depth {
            self.selective_depth = ply as u8;
        }
        if ply >= MAX_PLY {
            return eval::eval(position);
        }

        let in_check = position.in_check();
        if !in_check {
            let stand_pat = eval::eval(position);
            if stand_pat >= beta {
                return stand_pat;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
            if stand_pat < alpha - eval::PIECE_VALUES[QUEEN] {
                return alpha;
            }
        }

        let mut stack = MoveStack::new();
        stack.save();
        position.generate_moves(true, &mut stack);
        let moves: Vec<Move> = stack.current_slice().to_vec();
        stack.restore();

        let mut any_legal = false;
        for m in moves {
            if !in_check && see::see(position, m) < 0 {
                continue;
            }
            let child = match position.make_move(m) {
                Some(p) => p,
                None => continue,
            };
            any_legal = true;
            let raw = self.quiescence(&child, -beta, -alpha, ply + 1);
            let value = back_off_one_ply(-raw);
            if value >= beta {
                return value;
            }
            if value > alpha {
                alpha = value;
            }
            if self.cancelled {
                return alpha;
            }
        }

        if in_check && !any_legal {
            return -MATE;
        }
        alpha
    }
}

/// Requests made to the searcher thread (¤5: exactly one searcher, one
/// optional timer).
pub enum Command {
    Search { position: Position, depth: u8, options: EngineOptions },
    Stop,
    Exit,
}

/// Reports sent back from the searcher thread.
pub enum Report {
    Iteration(Iteration),
    Done(Iteration),
}

/// Runs the searcher's command loop on the calling thread. Intended to
/// be the body of the one searcher thread the engine spawns; the
/// command channel and cancellation flag are its only coupling to the
/// rest of the engine.
pub fn run_searcher(tt: Arc<TranspositionTable>, cancel: Arc<AtomicBool>, commands: mpsc::Receiver<Command>, reports: mpsc::Sender<Report>) {
    loop {
        let command = match commands.recv() {
            Ok(c) => c,
            Err(_) => break,
        };
        match command {
            Command::Search { position, depth, options } => {
                cancel.store(false, Ordering::Relaxed);
                let mut searcher = Searcher::new(&tt, options, &cancel);
                let reports_ref = &reports;
                let last = searcher.iterative_deepening(&position, depth, |iteration| {
                    reports_ref.send(Report::Iteration(iteration.clone())).ok();
                });
                reports.send(Report::Done(last)).ok();
            }
            Command::Stop => continue,
            Command::Exit => break,
        }
    }
}

/// A timer thread: waits out a duration (or is told to stop sooner)
/// and then sets the shared cancellation flag. Cancelling the timer
/// before it fires cancels the pending wait without setting the flag.
pub struct Timer {
    stop_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Timer {
    /// Starts a timer that sets `cancel` after `duration` unless
    /// cancelled first.
    pub fn start(cancel: Arc<AtomicBool>, duration: Duration) -> Timer {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let deadline = Instant::now() + duration;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    cancel.store(true, Ordering::Relaxed);
                    return;
                }
                match stop_rx.recv_timeout(remaining) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => continue,
                }
            }
        });
        Timer { stop_tx, handle: Some(handle) }
    }

    /// Cancels the pending wait; the cancellation flag is left
    /// untouched.
    pub fn cancel(mut self) {
        self.stop_tx.send(()).ok();
        if let Some(h) = self.handle.take() {
            h.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use crate::tt::TranspositionTable;

    fn search_to_depth(fen: &str, depth: u8) -> Iteration {
        let position = Position::from_fen(fen).unwrap();
        let tt = TranspositionTable::new(14);
        let cancel = AtomicBool::new(false);
        let mut searcher = Searcher::new(&tt, EngineOptions::default(), &cancel);
        searcher.iterative_deepening(&position, depth, |_| {})
    }

    #[test]
    fn finds_mate_in_two() {
        let iteration = search_to_depth("3k4/3Q4/3K4/8/8/8/8/8 w - - 0 1", 3);
        assert!(is_mate_score(iteration.value));
        assert!(iteration.value > 0);
        assert!(!iteration.pv.moves.is_empty());
    }

    #[test]
    fn stalemate_scores_as_a_draw() {
        let iteration = search_to_depth("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 1);
        assert_eq!(iteration.value, 0);
    }

    #[test]
    fn deterministic_given_a_fixed_depth_and_empty_table() {
        let a = search_to_depth("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", 3);
        let b = search_to_depth("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", 3);
        assert_eq!(a.value, b.value);
        assert_eq!(a.pv.moves, b.pv.moves);
    }

    #[test]
    fn material_up_search_prefers_the_winning_side() {
        let iteration = search_to_depth("4k3/8/8/8/8/8/4Q3/4K3 w - - 0 1", 2);
        assert!(iteration.value > 0);
    }
}
