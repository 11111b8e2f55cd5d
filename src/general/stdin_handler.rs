use std::io::stdin;
use std::sync::atomic::Ordering;
use std::thread;

use crate::general::check::{self, StatusSources};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Debug(bool),
    Stats,
    Help,
    Unknown(String),
}

/// Empty line or 'exit'/'quit'/'q' quit, 'debug on|off', 'stats', 'help'.
pub fn parse_command(line: &str) -> Command {
    let cmd = line.trim();
    if cmd.is_empty() {
        return Command::Exit;
    }
    let lower = cmd.to_ascii_lowercase();
    match lower.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["exit"] | ["quit"] | ["q"] => Command::Exit,
        ["debug", "on" | "enable"] => Command::Debug(true),
        ["debug", "off" | "disable"] => Command::Debug(false),
        ["stats"] | ["s"] => Command::Stats,
        ["help"] | ["h"] => Command::Help,
        _ => Command::Unknown(cmd.to_string()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  stats/s          - Show MIDI, decoder and OSC target counters");
    println!("  debug on/off     - Enable/Disable debug logging");
    println!("  help/h           - Show this help");
    println!("  exit/quit/q      - Exit program (an empty line works too)");
}

/// Spawn a thread that reads console commands. Quitting sets the global
/// `EXIT_FLAG`; end of input does too.
pub fn spawn_stdin_handler(sources: StatusSources) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    crate::EXIT_FLAG.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {}
            }
            match parse_command(&line) {
                Command::Exit => {
                    crate::EXIT_FLAG.store(true, Ordering::SeqCst);
                    break;
                }
                Command::Debug(enabled) => {
                    crate::set_debug_enabled(enabled);
                    println!("Debug {}", if enabled { "enabled" } else { "disabled" });
                }
                Command::Stats => check::print_stats(&sources),
                Command::Help => print_help(),
                Command::Unknown(cmd) => {
                    println!("Unrecognized command: '{}'. Type 'help' for available commands.", cmd)
                }
            }
        }
    })
}
