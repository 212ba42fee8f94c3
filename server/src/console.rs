//! Operator console: stdin reader thread, shared line queue, command parser

use log::{debug, error};
use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

pub const HELP: &str = "Possible commands:
  /quit               shut down the server
  /num_s <N>          players in a lobby required to start the game
  /game_sip <ip[:port]>  add a game server (port defaults to 27015)
  /print_lobbies      print all of the lobbies";

/// Lines typed by the operator, shared between the reader thread and the
/// dispatch loop
#[derive(Debug, Clone, Default)]
pub struct ConsoleQueue {
    lines: Arc<Mutex<VecDeque<String>>>,
    closed: Arc<AtomicBool>,
}

impl ConsoleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.lines().push_back(line.into());
    }

    /// Next non-blank line, trimmed
    pub fn next_line(&self) -> Option<String> {
        let mut lines = self.lines();
        while let Some(line) = lines.pop_front() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        None
    }

    /// Marks the input as finished; pending lines stay readable
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Starts a thread copying stdin lines into the queue. End of input or a
    /// read error closes the queue.
    pub fn spawn_stdin_reader(&self) -> std::io::Result<JoinHandle<()>> {
        let queue = self.clone();
        std::thread::Builder::new()
            .name("operator-console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => queue.push_line(line),
                        Err(e) => {
                            error!("Failed to read operator input: {}", e);
                            break;
                        }
                    }
                }
                debug!("Operator input closed");
                queue.close();
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Quit,
    SetQuorum(String),
    AddGameServer(String),
    PrintLobbies,
    Unknown(String),
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" => OperatorCommand::Quit,
            "/num_s" => OperatorCommand::SetQuorum(argument.to_string()),
            "/game_sip" => OperatorCommand::AddGameServer(argument.to_string()),
            "/print_lobbies" => OperatorCommand::PrintLobbies,
            _ => OperatorCommand::Unknown(line.to_string()),
        }
    }
}
