//! Client-side matchmaking state
//!
//! Tracks the lobby the player is in and the game server handed over by the
//! matchmaking server. Independent of the socket: every method returns the
//! messages to send and the lines to show, which keeps the flow testable.

use crate::input::{ClientCommand, HELP};
use lobby_shared::{LobbyData, LobbyId, Message, TeamMode};
use log::{info, warn};

/// What the session wants done after an event
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Messages to send to the matchmaking server, in order
    pub replies: Vec<Message>,
    /// Lines to show the player
    pub display: Vec<String>,
    /// The player asked to disconnect
    pub quit: bool,
}

impl Reaction {
    fn reply(message: Message) -> Self {
        Self {
            replies: vec![message],
            ..Self::default()
        }
    }

    fn show(line: impl Into<String>) -> Self {
        Self {
            display: vec![line.into()],
            ..Self::default()
        }
    }
}

pub struct LobbySession {
    lobby: Option<LobbyId>,
    game_server: Option<String>,
    auto_start: bool,
}

impl LobbySession {
    pub fn new(auto_start: bool) -> Self {
        Self {
            lobby: None,
            game_server: None,
            auto_start,
        }
    }

    pub fn current_lobby(&self) -> Option<LobbyId> {
        self.lobby
    }

    /// Game server received in the last `startGame` that was not used yet
    pub fn pending_game_server(&self) -> Option<&str> {
        self.game_server.as_deref()
    }

    pub fn handle_message(&mut self, message: Message) -> Reaction {
        match message {
            Message::Chat(bytes) => Reaction::show(String::from_utf8_lossy(&bytes).into_owned()),

            Message::LobbyList(ids) => match ids.first() {
                Some(&id) => {
                    info!("{} open lobbies, joining {}", ids.len(), id);
                    Reaction::reply(Message::RequestJoinLobby(id))
                }
                None => Reaction::reply(Message::RequestCreateLobby),
            },

            Message::NoSuitableLobbies => {
                if self.lobby.is_none() {
                    info!("No suitable lobbies, creating one");
                    Reaction::reply(Message::RequestCreateLobby)
                } else {
                    Reaction::show("The server does not know that lobby")
                }
            }

            Message::LobbyIdAssignedOnJoin(id) => {
                self.lobby = Some(id);
                Reaction::show(format!("Joined lobby: {}", id))
            }

            Message::LobbyIdAssignedOnCreate(id) => {
                self.lobby = Some(id);
                Reaction::show(format!("Created lobby: {}", id))
            }

            Message::LobbyData(data) => Reaction::show(describe_lobby(&data)),

            Message::EchoReply(value) => Reaction::show(format!("Echoed: {}", value)),

            Message::StartGame(game_server) => {
                self.game_server = Some(game_server);
                let mut reaction = Reaction::show("Ready to start the match!");
                if self.auto_start {
                    let launch = self.start_game();
                    reaction.replies.extend(launch.replies);
                    reaction.display.extend(launch.display);
                }
                reaction
            }

            other @ (Message::RequestLobbyList
            | Message::RequestCreateLobby
            | Message::RequestJoinLobby(_)
            | Message::RequestLeaveLobby
            | Message::RequestLobbyData(_)
            | Message::RequestEcho(_)) => {
                warn!("Unexpected server-bound {:?} from the server", other.tag());
                Reaction::default()
            }
        }
    }

    pub fn handle_command(&mut self, command: ClientCommand) -> Reaction {
        match command {
            ClientCommand::FindGame => match self.lobby {
                Some(id) => Reaction::show(format!("Already in a lobby! LobbyID: {}", id)),
                None => Reaction::reply(Message::RequestLobbyList),
            },

            ClientCommand::LeaveLobby => self.leave_lobby(),

            ClientCommand::LobbyInfo => match self.lobby {
                Some(id) => Reaction::reply(Message::RequestLobbyData(id)),
                None => Reaction::show("Not in a lobby"),
            },

            ClientCommand::SetLobby { map, team_mode } => match self.lobby {
                Some(lobby_id) => {
                    let data = LobbyData {
                        lobby_id,
                        map,
                        team_mode,
                    };
                    let mut reaction = Reaction::reply(Message::LobbyData(data));
                    reaction.display.push(describe_lobby(&data));
                    reaction
                }
                None => Reaction::show("Not in a lobby"),
            },

            ClientCommand::Echo(value) => Reaction::reply(Message::RequestEcho(value)),

            ClientCommand::StartGame => self.start_game(),

            ClientCommand::Quit => {
                let mut reaction = self.leave_lobby_quietly();
                reaction.display.push("Disconnecting from matchmaking server".to_string());
                reaction.quit = true;
                reaction
            }

            ClientCommand::Chat(text) => Reaction::reply(Message::chat(text)),

            ClientCommand::Invalid(reason) => {
                let mut reaction = Reaction::show(reason);
                reaction.display.extend(HELP.lines().map(str::to_string));
                reaction
            }
        }
    }

    fn start_game(&mut self) -> Reaction {
        match self.game_server.take() {
            Some(game_server) => {
                let mut reaction = self.leave_lobby_quietly();
                reaction.display.insert(0, format!("connect {}", game_server));
                reaction
            }
            None => Reaction::show(
                "Can't start the game! Haven't received a game server from the matchmaking server",
            ),
        }
    }

    fn leave_lobby(&mut self) -> Reaction {
        match self.lobby.take() {
            Some(id) => Reaction {
                replies: vec![Message::RequestLeaveLobby],
                display: vec![format!("Left lobby: {}", id)],
                quit: false,
            },
            None => Reaction::show("Can't leave lobby, currently not in one!"),
        }
    }

    fn leave_lobby_quietly(&mut self) -> Reaction {
        match self.lobby.take() {
            Some(_) => Reaction::reply(Message::RequestLeaveLobby),
            None => Reaction::default(),
        }
    }
}

pub fn describe_lobby(data: &LobbyData) -> String {
    let team_mode = match data.team_mode {
        TeamMode::Unset => "unset",
        TeamMode::Off => "off",
        TeamMode::On => "on",
    };
    format!(
        "Lobby {}: map {}, team deathmatch {}",
        data.lobby_id,
        data.map.name(),
        team_mode
    )
}
