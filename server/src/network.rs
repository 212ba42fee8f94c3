//! Dispatch loop coordinating connections, lobbies, chat and game launches
//!
//! All registry state lives on the task that drives [`Server::tick`]. Each
//! tick launches full lobbies, drains client messages, drains connection
//! events and finally applies operator commands.

use crate::chat::{self, ChatCommand};
use crate::client_manager::{ClientManager, Nickname};
use crate::config::ServerConfig;
use crate::console::{ConsoleQueue, OperatorCommand, HELP};
use crate::launch::{LaunchGateway, LaunchReport};
use crate::lobby::LobbyManager;
use crate::rcon::RemoteConsole;
use crate::transport::{
    ConnectionId, ConnectionState, ConnectionStatusChanged, IncomingMessage, ServerTransport,
};
use lobby_shared::{Message, MAX_CHAT_LEN};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Reason given to clients when the server closes their connection on exit
pub const SHUTDOWN_REASON: &str = "Server Shutdown";

/// Time given to lingering connections to flush before the process exits
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Main server owning every registry and the transport
pub struct Server<T: ServerTransport, R: RemoteConsole> {
    transport: T,
    config: ServerConfig,
    clients: ClientManager,
    lobbies: LobbyManager,
    gateway: LaunchGateway<R>,
    console: ConsoleQueue,
    rng: StdRng,
    quit_requested: bool,
    empty_pool_warned: bool,
}

impl<T: ServerTransport, R: RemoteConsole> Server<T, R> {
    pub fn new(transport: T, config: ServerConfig, remote: R, console: ConsoleQueue) -> Self {
        Self::build(
            transport,
            config,
            remote,
            console,
            LobbyManager::new(),
            StdRng::from_entropy(),
        )
    }

    /// Same as [`Server::new`] with deterministic nicknames and lobby ids
    pub fn with_seed(
        transport: T,
        config: ServerConfig,
        remote: R,
        console: ConsoleQueue,
        seed: u64,
    ) -> Self {
        Self::build(
            transport,
            config,
            remote,
            console,
            LobbyManager::with_seed(seed),
            StdRng::seed_from_u64(seed.wrapping_add(1)),
        )
    }

    fn build(
        transport: T,
        config: ServerConfig,
        remote: R,
        console: ConsoleQueue,
        lobbies: LobbyManager,
        rng: StdRng,
    ) -> Self {
        Self {
            transport,
            config,
            clients: ClientManager::new(),
            lobbies,
            gateway: LaunchGateway::new(remote),
            console,
            rng,
            quit_requested: false,
            empty_pool_warned: false,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn lobbies(&self) -> &LobbyManager {
        &self.lobbies
    }

    pub fn remote(&self) -> &R {
        self.gateway.remote()
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Runs one iteration of the dispatch loop
    ///
    /// Returns a report for every lobby launched during this tick.
    pub fn tick(&mut self) -> Vec<LaunchReport> {
        let reports = self.check_quorum();
        self.poll_incoming_messages();
        self.poll_connection_events();
        self.poll_console();
        reports
    }

    /// Launches every lobby whose member count reached quorum
    fn check_quorum(&mut self) -> Vec<LaunchReport> {
        let ready = self.lobbies.lobbies_at_quorum(self.config.quorum);
        if ready.is_empty() {
            return Vec::new();
        }

        let target = match self.config.launch_target() {
            Some(target) => target.clone(),
            None => {
                if !self.empty_pool_warned {
                    warn!(
                        "{} lobbies reached quorum but no game server is registered (use /game_sip)",
                        ready.len()
                    );
                    self.empty_pool_warned = true;
                }
                return Vec::new();
            }
        };
        self.empty_pool_warned = false;

        let mut reports = Vec::with_capacity(ready.len());
        for id in ready {
            let lobby = match self.lobbies.take_lobby(id) {
                Some(lobby) => lobby,
                None => continue,
            };
            info!(
                "Lobby {} has {} players, starting the game on {}",
                id,
                lobby.len(),
                target.socket_addr()
            );

            let report = self.gateway.launch(&lobby, &target);
            let start = Message::StartGame(report.connect_string.clone());

            for connection in lobby.member_connections() {
                self.send(connection, &start);
                if let Some(player) = lobby.members.get(&connection) {
                    info!("{} ({}) left lobby {} for the game", connection, player.client.nickname, id);
                }
            }
            info!("Lobby {} destroyed after launch", id);
            reports.push(report);
        }

        reports
    }

    fn poll_incoming_messages(&mut self) {
        while !self.quit_requested {
            match self.transport.receive_message() {
                Some(message) => self.handle_message(message),
                None => break,
            }
        }
    }

    /// Routes one client message by its tag
    fn handle_message(&mut self, incoming: IncomingMessage) {
        let connection = incoming.connection;
        let client = match self.clients.get(connection) {
            Some(client) => client.clone(),
            None => {
                warn!("Ignoring message from unknown connection {}", connection);
                return;
            }
        };

        let message = match Message::decode(&incoming.data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed message from {}: {}", connection, e);
                return;
            }
        };

        match message {
            Message::Chat(text) => self.handle_chat(connection, &text),

            Message::RequestLobbyList => {
                let ids = self.lobbies.list_lobbies();
                if ids.is_empty() {
                    self.send(connection, &Message::NoSuitableLobbies);
                } else {
                    self.send(connection, &Message::LobbyList(ids));
                }
            }

            Message::RequestCreateLobby => {
                let id = self.lobbies.create_lobby(connection, client);
                self.send(connection, &Message::LobbyIdAssignedOnCreate(id));
            }

            Message::RequestJoinLobby(id) => match self.lobbies.join_lobby(id, connection, client) {
                Ok(()) => self.send(connection, &Message::LobbyIdAssignedOnJoin(id)),
                Err(e) => {
                    warn!("{} failed to join: {}", connection, e);
                    self.send(connection, &Message::NoSuitableLobbies);
                }
            },

            Message::RequestLeaveLobby => match self.lobbies.leave_lobby(connection) {
                Some(outcome) if outcome.destroyed => {
                    debug!("{} left lobby {}, which is now gone", connection, outcome.lobby_id)
                }
                Some(outcome) => debug!("{} left lobby {}", connection, outcome.lobby_id),
                None => debug!("{} asked to leave but is in no lobby", connection),
            },

            Message::RequestLobbyData(id) => match self.lobbies.metadata(id) {
                Ok(data) => {
                    self.send(connection, &Message::LobbyData(data));
                    debug!("Sent metadata of lobby {} to {}", id, connection);
                }
                Err(e) => {
                    warn!("{} requested metadata: {}", connection, e);
                    self.send(connection, &Message::NoSuitableLobbies);
                }
            },

            Message::LobbyData(data) => {
                if let Err(e) = self
                    .lobbies
                    .set_metadata(data.lobby_id, data.map, data.team_mode)
                {
                    warn!("{} sent metadata: {}", connection, e);
                }
            }

            Message::RequestEcho(value) => {
                self.send(connection, &Message::EchoReply(value));
                debug!("Echoed {} to {}", value, connection);
            }

            other @ (Message::LobbyList(_)
            | Message::LobbyIdAssignedOnJoin(_)
            | Message::LobbyIdAssignedOnCreate(_)
            | Message::NoSuitableLobbies
            | Message::StartGame(_)
            | Message::EchoReply(_)) => {
                warn!("Ignoring client-bound {:?} from {}", other.tag(), connection);
            }
        }
    }

    fn handle_chat(&mut self, connection: ConnectionId, text: &[u8]) {
        let nickname = match self.clients.nickname(connection) {
            Some(nickname) => nickname.clone(),
            None => return,
        };

        match ChatCommand::parse(text) {
            ChatCommand::Rename(new_nickname) => {
                self.broadcast_chat_except(
                    connection,
                    &chat::renamed(nickname.as_bytes(), new_nickname),
                );
                self.send_chat(connection, &chat::rename_reply(new_nickname));
                self.set_nickname(connection, &Nickname::from(new_nickname));
            }
            ChatCommand::RenameUsage => self.send_chat(connection, chat::NICK_USAGE.as_bytes()),
            ChatCommand::RenameTooLong => self.send_chat(connection, &chat::nickname_too_long()),
            ChatCommand::Say(said) => {
                let line = chat::format_chat(nickname.as_bytes(), said);
                if line.len() > MAX_CHAT_LEN {
                    warn!("Dropping {}-byte chat from {}", said.len(), connection);
                    self.send_chat(connection, chat::CHAT_TOO_LONG.as_bytes());
                } else {
                    self.broadcast_chat_except(connection, &line);
                }
            }
        }
    }

    fn set_nickname(&mut self, connection: ConnectionId, nickname: &Nickname) {
        self.clients.rename(connection, nickname);
        self.lobbies.rename_member(connection, nickname);
        self.transport
            .set_connection_name(connection, &nickname.to_string());
    }

    fn poll_connection_events(&mut self) {
        while let Some(event) = self.transport.poll_connection_event() {
            self.on_connection_status_changed(event);
        }
    }

    fn on_connection_status_changed(&mut self, event: ConnectionStatusChanged) {
        match event.state {
            ConnectionState::Connecting => self.on_connecting(&event),
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally => {
                self.on_closed(&event)
            }
            ConnectionState::None | ConnectionState::Connected => {
                debug!("Connection {} is now {:?}", event.description, event.state);
            }
        }
    }

    fn on_connecting(&mut self, event: &ConnectionStatusChanged) {
        let connection = event.connection;
        if self.clients.contains(connection) {
            warn!("Duplicate connect for known connection {}", connection);
            return;
        }
        info!("Connection request from {}", event.description);

        if let Err(e) = self.transport.accept_connection(connection) {
            warn!("Can't accept connection {}: {}", event.description, e);
            self.transport.close_connection(connection, "", false);
            return;
        }

        let companions: Vec<Nickname> = self
            .clients
            .roster()
            .map(|(_, nickname)| nickname.clone())
            .collect();
        let nickname = self.clients.add_client(connection, &mut self.rng);

        self.send_chat(connection, &chat::welcome(nickname.as_bytes()));
        if companions.is_empty() {
            self.send_chat(connection, chat::ALONE.as_bytes());
        } else {
            self.send_chat(connection, &chat::companions(companions.len()));
            for companion in &companions {
                self.send_chat(connection, companion.as_bytes());
            }
        }
        self.broadcast_chat_except(connection, &chat::joined(nickname.as_bytes()));
        self.transport
            .set_connection_name(connection, &nickname.to_string());
    }

    fn on_closed(&mut self, event: &ConnectionStatusChanged) {
        let connection = event.connection;

        if event.old_state == ConnectionState::Connected {
            if let Some(client) = self.clients.get(connection).cloned() {
                let notice = if event.state == ConnectionState::ProblemDetectedLocally {
                    info!(
                        "Connection {} problem detected locally: {}",
                        event.description, event.end_reason
                    );
                    chat::lost(client.nickname.as_bytes(), &event.end_reason)
                } else {
                    info!(
                        "Connection {} closed by peer: {}",
                        event.description, event.end_reason
                    );
                    chat::left(client.nickname.as_bytes())
                };

                self.lobbies.leave_lobby(connection);
                self.clients.remove_client(connection);
                self.broadcast_chat(&notice);
            } else {
                warn!("Close event for unknown connection {}", event.description);
            }
        } else {
            debug!("Connection {} closed before it was accepted", event.description);
        }

        self.transport.close_connection(connection, "", false);
    }

    fn poll_console(&mut self) {
        while !self.quit_requested {
            match self.console.next_line() {
                Some(line) => self.apply_operator_command(OperatorCommand::parse(&line)),
                None => break,
            }
        }

        if !self.quit_requested && self.console.is_closed() {
            info!("Operator input closed, shutting down");
            self.quit_requested = true;
        }
    }

    pub fn apply_operator_command(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::Quit => {
                info!("Shutting down server");
                self.quit_requested = true;
            }
            OperatorCommand::SetQuorum(argument) => {
                match self.config.set_quorum_from_str(&argument) {
                    Ok(quorum) => info!(
                        "Number of players in a lobby required for the game to start: {}",
                        quorum
                    ),
                    Err(e) => warn!("{}", e),
                }
            }
            OperatorCommand::AddGameServer(argument) => {
                match self.config.add_game_server(&argument) {
                    Ok(added) => {
                        let added = added.socket_addr();
                        let front = self.config.launch_target().map(|t| t.socket_addr());
                        info!("Game server {} registered", added);
                        if let Some(front) = front {
                            info!("Launching games on {}", front);
                        }
                    }
                    Err(e) => warn!("Invalid game server address: {}", e),
                }
            }
            OperatorCommand::PrintLobbies => self.lobbies.log_lobbies(),
            OperatorCommand::Unknown(line) => {
                info!("Unknown command '{}'", line);
                for help_line in HELP.lines() {
                    info!("{}", help_line);
                }
            }
        }
    }

    fn send(&mut self, connection: ConnectionId, message: &Message) {
        if let Err(e) = self.transport.send_message(connection, &message.encode()) {
            error!("Failed to send {:?} to {}: {}", message.tag(), connection, e);
        }
    }

    fn send_chat(&mut self, connection: ConnectionId, text: &[u8]) {
        self.send(connection, &Message::chat(text));
    }

    fn broadcast_chat(&mut self, text: &[u8]) {
        let message = Message::chat(text);
        for connection in self.clients.connections() {
            self.send(connection, &message);
        }
    }

    fn broadcast_chat_except(&mut self, excluded: ConnectionId, text: &[u8]) {
        let message = Message::chat(text);
        for connection in self.clients.connections_except(excluded) {
            self.send(connection, &message);
        }
    }

    /// Says goodbye to every client, closes all connections and releases
    /// the transport
    pub fn shutdown(&mut self) {
        info!("Closing all connections");
        for connection in self.clients.connections() {
            self.send_chat(connection, chat::FAREWELL.as_bytes());
            self.transport
                .close_connection(connection, SHUTDOWN_REASON, true);
        }

        self.clients.clear();
        self.lobbies.clear();
        self.transport.shutdown();
    }

    /// Ticks at the configured rate until quit is requested or Ctrl+C
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick_interval = interval(self.config.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            "Server started: quorum {}, {} game servers, tick every {:?}",
            self.config.quorum,
            self.config.game_servers.len(),
            self.config.tick_interval
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.tick();
                    if self.quit_requested {
                        break;
                    }
                },

                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl+C: {}", e);
                    }
                    info!("Interrupted, shutting down server");
                    break;
                }
            }
        }

        self.shutdown();
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameServerTarget;
    use crate::rcon::RconError;
    use crate::transport::MemoryTransport;

    struct SilentConsole;

    impl RemoteConsole for SilentConsole {
        fn execute(&mut self, _target: &GameServerTarget, _command: &str) -> Result<String, RconError> {
            Ok(String::new())
        }
    }

    fn test_server() -> (Server<MemoryTransport, SilentConsole>, MemoryTransport, ConsoleQueue) {
        let transport = MemoryTransport::new();
        let console = ConsoleQueue::new();
        let server = Server::with_seed(
            transport.clone(),
            ServerConfig::default(),
            SilentConsole,
            console.clone(),
            42,
        );
        (server, transport, console)
    }

    #[test]
    fn test_first_client_is_alone() {
        let (mut server, transport, _console) = test_server();
        let conn = transport.connect();
        server.tick();

        assert!(transport.is_connected(conn));
        let chat = transport.take_chat(conn);
        assert_eq!(chat.len(), 2);
        assert!(chat[0].starts_with(b"Welcome"));
        assert_eq!(chat[1], chat::ALONE.as_bytes());

        let nickname = server.clients().nickname(conn).unwrap().to_string();
        assert_eq!(transport.connection_name(conn), Some(nickname));
    }

    #[test]
    fn test_second_client_gets_roster() {
        let (mut server, transport, _console) = test_server();
        let first = transport.connect();
        server.tick();
        transport.take_sent(first);
        let first_nick = server.clients().nickname(first).unwrap().clone();

        let second = transport.connect();
        server.tick();
        let second_nick = server.clients().nickname(second).unwrap().clone();

        let chat = transport.take_chat(second);
        assert_eq!(chat[1], chat::companions(1));
        assert_eq!(chat[2], first_nick.as_bytes());

        assert_eq!(
            transport.take_chat(first),
            vec![chat::joined(second_nick.as_bytes())]
        );
    }

    #[test]
    fn test_echo() {
        let (mut server, transport, _console) = test_server();
        let conn = transport.connect();
        server.tick();
        transport.take_sent(conn);

        transport.deliver(conn, &Message::RequestEcho(432000));
        server.tick();
        assert_eq!(transport.take_sent(conn), vec![Message::EchoReply(432000)]);
    }

    #[test]
    fn test_malformed_messages_are_ignored() {
        let (mut server, transport, _console) = test_server();
        let conn = transport.connect();
        server.tick();
        transport.take_sent(conn);

        transport.deliver_raw(conn, vec![]);
        transport.deliver_raw(conn, vec![200, 1, 2]);
        transport.deliver_raw(conn, vec![5, 1]);
        transport.deliver(conn, &Message::NoSuitableLobbies);
        server.tick();

        assert!(transport.take_sent(conn).is_empty());
        assert!(transport.is_connected(conn));
        assert!(!server.is_quit_requested());
    }

    #[test]
    fn test_console_quit_and_eof() {
        let (mut server, _transport, console) = test_server();
        console.push_line("/quit");
        server.tick();
        assert!(server.is_quit_requested());

        let (mut server, _transport, console) = test_server();
        console.close();
        server.tick();
        assert!(server.is_quit_requested());
    }

    #[test]
    fn test_bad_operator_input_changes_nothing() {
        let (mut server, _transport, console) = test_server();
        console.push_line("/num_s zero");
        console.push_line("/num_s 0");
        console.push_line("/game_sip nowhere");
        console.push_line("/bogus");
        server.tick();

        assert_eq!(server.config().quorum, 2);
        assert!(server.config().game_servers.is_empty());
        assert!(!server.is_quit_requested());
    }

    #[test]
    fn test_shutdown_says_goodbye() {
        let (mut server, transport, _console) = test_server();
        let conn = transport.connect();
        server.tick();
        transport.take_sent(conn);

        server.shutdown();
        assert_eq!(transport.take_chat(conn), vec![chat::FAREWELL.as_bytes().to_vec()]);
        assert_eq!(transport.closed_with_linger(conn), Some(true));
        assert_eq!(transport.close_reason(conn).as_deref(), Some(SHUTDOWN_REASON));
        assert!(transport.is_shut_down());
        assert!(server.clients().is_empty());
    }
}
