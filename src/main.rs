#[macro_use]
extern crate lazy_static;
extern crate rand;
extern crate regex;

pub mod basetypes;
pub mod bitsets;
pub mod book;
pub mod castling;
pub mod commands;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod geometry;
pub mod move_order;
pub mod moves;
pub mod notation;
pub mod options;
pub mod position;
pub mod search;
pub mod see;
pub mod tt;
pub mod zobrist;

use std::io::{self, BufRead, Write};
use std::process::exit;
use std::sync::mpsc::{channel, TryRecvError};
use std::thread;
use std::time::Duration;

use commands::{apply, parse_command, Response};
use engine::Engine;
use options::EngineOptions;
use search::Report;

/// Renders one search-progress line for the `Info` response a
/// completed or in-progress iteration produces.
fn format_iteration(tag: &str, iteration: &search::Iteration) -> String {
    let pv: Vec<String> = iteration.pv.moves.iter().map(|m| notation::move_to_coordinate_string(*m)).collect();
    format!(
        "{} depth={} value={} nodes={} pv={}",
        tag,
        iteration.depth,
        iteration.value,
        iteration.nodes,
        pv.join(" ")
    )
}

fn print_response(out: &mut impl Write, response: Response) {
    match response {
        Response::Ok => {}
        Response::Pong(token) => {
            writeln!(out, "pong {}", token).ok();
        }
        Response::Eval(value) => {
            writeln!(out, "eval {}", value).ok();
        }
        Response::PerftResult(count) => {
            writeln!(out, "perft {}", count).ok();
        }
        Response::DivideResult(rows) => {
            for (mv, count) in rows {
                writeln!(out, "{} {}", mv, count).ok();
            }
        }
        Response::Info(message) => {
            writeln!(out, "info {}", message).ok();
        }
    }
    out.flush().ok();
}

/// Drains whatever the searcher thread has reported since the last
/// poll and prints one line per iteration, plus a `bestmove` line once
/// a search completes.
fn drain_reports(engine: &mut Engine, out: &mut impl Write) {
    for report in engine.poll_reports() {
        match report {
            Report::Iteration(iteration) => {
                writeln!(out, "{}", format_iteration("info", &iteration)).ok();
            }
            Report::Done(iteration) => {
                writeln!(out, "{}", format_iteration("info", &iteration)).ok();
                if let Some(m) = iteration.pv.moves.first() {
                    writeln!(out, "bestmove {}", notation::move_to_coordinate_string(*m)).ok();
                } else {
                    writeln!(out, "bestmove (none)").ok();
                }
            }
        }
        out.flush().ok();
    }
}

/// Blocks the current thread and serves commands read from stdin,
/// one line at a time, until `quit`/`exit` or end of input.
///
/// A reader thread owns the blocking `read_line` call and forwards
/// whole lines over a channel; the main loop drains that channel
/// without blocking so it can also poll the searcher thread for
/// progress reports in between commands.
fn serve(mut engine: Engine) -> io::Result<()> {
    let mut stdout = io::stdout();
    let (tx, rx) = channel::<String>();

    thread::spawn(move || {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        return;
                    }
                }
            }
        }
    });

    loop {
        match rx.try_recv() {
            Ok(line) => {
                if line.is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(commands::Command::Quit) => return Ok(()),
                    Ok(command) => match apply(&mut engine, command) {
                        Ok(response) => print_response(&mut stdout, response),
                        Err(e) => {
                            writeln!(stdout, "error {}", e).ok();
                            stdout.flush().ok();
                        }
                    },
                    Err(e) => {
                        writeln!(stdout, "error {}", e).ok();
                        stdout.flush().ok();
                    }
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Ok(()),
        }

        drain_reports(&mut engine, &mut stdout);
        thread::sleep(Duration::from_millis(10));
    }
}

fn main() {
    env_logger::init();
    let engine = match Engine::new(EngineOptions::default()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to start engine: {}", e);
            exit(1);
        }
    };
    exit(match serve(engine) {
        Ok(()) => 0,
        Err(_) => 1,
    })
}
