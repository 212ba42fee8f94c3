//! Game-launch gateway
//!
//! Configures the launch target for a full lobby and produces the connect
//! string its members are sent. Remote console failures are recorded but
//! never stop the handoff.

use crate::config::GameServerTarget;
use crate::lobby::Lobby;
use crate::rcon::RemoteConsole;
use lobby_shared::{GameMap, LobbyId, TeamMode};
use log::{info, warn};

/// Map launched when the lobby never chose one
pub const FALLBACK_MAP: GameMap = GameMap::DmLockdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Every remote command succeeded
    Complete,
    /// Some commands failed
    Partial(Vec<CommandFailure>),
    /// No command succeeded; players are still sent to the target
    Failed(Vec<CommandFailure>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub lobby_id: LobbyId,
    pub connect_string: String,
    pub outcome: LaunchOutcome,
}

impl LaunchReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == LaunchOutcome::Complete
    }
}

/// Remote console commands that prepare a match for `lobby`, in order
pub fn launch_commands(lobby: &Lobby) -> Vec<String> {
    let teamplay = match lobby.team_mode {
        TeamMode::On => 1,
        TeamMode::Off | TeamMode::Unset => 0,
    };
    let map = match lobby.map {
        GameMap::Unset => FALLBACK_MAP,
        map => map,
    };

    vec![
        format!("mp_teamplay {}", teamplay),
        format!("changelevel {}", map.name()),
    ]
}

pub struct LaunchGateway<R: RemoteConsole> {
    remote: R,
}

impl<R: RemoteConsole> LaunchGateway<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn launch(&mut self, lobby: &Lobby, target: &GameServerTarget) -> LaunchReport {
        let commands = launch_commands(lobby);
        let mut failures = Vec::new();

        for command in &commands {
            match self.remote.execute(target, command) {
                Ok(response) => info!(
                    "Lobby {}: '{}' on {} -> {}",
                    lobby.id,
                    command,
                    target.socket_addr(),
                    response.trim()
                ),
                Err(e) => {
                    warn!(
                        "Lobby {}: '{}' on {} failed: {}",
                        lobby.id,
                        command,
                        target.socket_addr(),
                        e
                    );
                    failures.push(CommandFailure {
                        command: command.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let outcome = if failures.is_empty() {
            LaunchOutcome::Complete
        } else if failures.len() == commands.len() {
            LaunchOutcome::Failed(failures)
        } else {
            LaunchOutcome::Partial(failures)
        };

        LaunchReport {
            lobby_id: lobby.id,
            connect_string: target.connect_string(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::LobbyManager;
    use crate::rcon::RconError;
    use crate::client_manager::ClientInfo;
    use crate::transport::ConnectionId;
    use std::io;

    #[derive(Default)]
    struct RecordingConsole {
        commands: Vec<String>,
        failing: Vec<&'static str>,
    }

    impl RemoteConsole for RecordingConsole {
        fn execute(&mut self, _target: &GameServerTarget, command: &str) -> Result<String, RconError> {
            self.commands.push(command.to_string());
            if self.failing.iter().any(|prefix| command.starts_with(prefix)) {
                return Err(RconError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            Ok(String::new())
        }
    }

    fn lobby_with(map: GameMap, team_mode: TeamMode) -> Lobby {
        let mut lobbies = LobbyManager::with_seed(1);
        let id = lobbies.create_lobby(ConnectionId(1), ClientInfo::new("a"));
        lobbies.set_metadata(id, map, team_mode).unwrap();
        lobbies.take_lobby(id).unwrap()
    }

    fn target() -> GameServerTarget {
        GameServerTarget::parse("127.0.1.1", "123").unwrap()
    }

    #[test]
    fn test_commands_for_chosen_settings() {
        let lobby = lobby_with(GameMap::DmUnderpass, TeamMode::On);
        assert_eq!(
            launch_commands(&lobby),
            vec!["mp_teamplay 1", "changelevel dm_underpass"]
        );
    }

    #[test]
    fn test_commands_for_unset_settings() {
        let lobby = lobby_with(GameMap::Unset, TeamMode::Unset);
        assert_eq!(
            launch_commands(&lobby),
            vec!["mp_teamplay 0", "changelevel dm_lockdown"]
        );
    }

    #[test]
    fn test_complete_launch() {
        let mut gateway = LaunchGateway::new(RecordingConsole::default());
        let report = gateway.launch(&lobby_with(GameMap::Halls3, TeamMode::Off), &target());

        assert!(report.is_complete());
        assert_eq!(report.connect_string, "127.0.1.1:27015");
        assert_eq!(gateway.remote().commands.len(), 2);
    }

    #[test]
    fn test_partial_failure_still_hands_off() {
        let mut gateway = LaunchGateway::new(RecordingConsole {
            failing: vec!["changelevel"],
            ..RecordingConsole::default()
        });
        let report = gateway.launch(&lobby_with(GameMap::DmRunoff, TeamMode::On), &target());

        assert_eq!(report.connect_string, "127.0.1.1:27015");
        match report.outcome {
            LaunchOutcome::Partial(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].command, "changelevel dm_runoff");
            }
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_total_failure_runs_every_command() {
        let mut gateway = LaunchGateway::new(RecordingConsole {
            failing: vec!["mp_teamplay", "changelevel"],
            ..RecordingConsole::default()
        });
        let report = gateway.launch(&lobby_with(GameMap::Unset, TeamMode::Unset), &target());

        assert!(matches!(report.outcome, LaunchOutcome::Failed(ref f) if f.len() == 2));
        assert_eq!(gateway.remote().commands.len(), 2);
    }
}
