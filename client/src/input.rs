//! Console command parsing for the matchmaking client

use lobby_shared::{GameMap, TeamMode};

/// Value sent by `/echo` when no number is given
pub const DEFAULT_ECHO_VALUE: u32 = 432000;

pub const HELP: &str = "Commands:
  /find_game              join a lobby, creating one if none is open
  /leave_lobby            leave the current lobby
  /lobby_info             show map and team mode of the current lobby
  /set_lobby <map> [on|off]  choose map and team mode of the current lobby
  /echo [n]               ask the server to echo a number
  /start_game             connect to the game server once a match is ready
  /quit                   disconnect
Anything else is sent as chat (try /nick <name>).";

/// A line typed by the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    FindGame,
    LeaveLobby,
    LobbyInfo,
    SetLobby { map: GameMap, team_mode: TeamMode },
    Echo(u32),
    StartGame,
    Quit,
    Chat(String),
    /// A known command with bad arguments; carries the message to show
    Invalid(String),
}

impl ClientCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();

        match command {
            "/find_game" => ClientCommand::FindGame,
            "/leave_lobby" => ClientCommand::LeaveLobby,
            "/lobby_info" => ClientCommand::LobbyInfo,
            "/start_game" => ClientCommand::StartGame,
            "/quit" => ClientCommand::Quit,
            "/echo" => match args.first() {
                None => ClientCommand::Echo(DEFAULT_ECHO_VALUE),
                Some(value) => match value.parse() {
                    Ok(value) => ClientCommand::Echo(value),
                    Err(_) => ClientCommand::Invalid(format!("Not a number: '{}'", value)),
                },
            },
            "/set_lobby" => parse_set_lobby(&args),
            _ => ClientCommand::Chat(line.to_string()),
        }
    }
}

fn parse_set_lobby(args: &[&str]) -> ClientCommand {
    let map = match args.first().map(|name| GameMap::from_name(name)) {
        Some(Some(map)) => map,
        Some(None) => {
            let names: Vec<&str> = GameMap::PLAYABLE.iter().map(|map| map.name()).collect();
            return ClientCommand::Invalid(format!(
                "Unknown map '{}'. Maps: {}",
                args[0],
                names.join(", ")
            ));
        }
        None => return ClientCommand::Invalid("Usage: /set_lobby <map> [on|off]".to_string()),
    };

    let team_mode = match args.get(1).map(|flag| flag.to_ascii_lowercase()) {
        None => TeamMode::Unset,
        Some(flag) => match flag.as_str() {
            "on" | "1" | "true" | "tdm" => TeamMode::On,
            "off" | "0" | "false" | "dm" => TeamMode::Off,
            _ => {
                return ClientCommand::Invalid(format!(
                    "Team mode must be on or off, not '{}'",
                    flag
                ))
            }
        },
    };

    ClientCommand::SetLobby { map, team_mode }
}
