//! Lobby registry and membership state machine
//!
//! A lobby is forming while it has between one and quorum-1 members. The
//! dispatch loop launches it once the member count reaches quorum, and the
//! registry destroys it as soon as its last member leaves. Each connection is
//! a member of at most one lobby: creating or joining another lobby first
//! leaves the current one.

use crate::client_manager::{ClientInfo, Nickname};
use crate::transport::ConnectionId;
use lobby_shared::{GameMap, LobbyData, LobbyId, TeamMode};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("no lobby with id {0}")]
    NoSuchLobby(LobbyId),
}

/// A lobby member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub client: ClientInfo,
    /// Reserved for team assignment; always false for now
    pub is_opponent: bool,
}

impl Player {
    pub fn new(client: ClientInfo) -> Self {
        Self {
            client,
            is_opponent: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: LobbyId,
    pub members: HashMap<ConnectionId, Player>,
    pub map: GameMap,
    pub team_mode: TeamMode,
}

impl Lobby {
    fn new(id: LobbyId) -> Self {
        Self {
            id,
            members: HashMap::new(),
            map: GameMap::default(),
            team_mode: TeamMode::default(),
        }
    }

    pub fn data(&self) -> LobbyData {
        LobbyData {
            lobby_id: self.id,
            map: self.map,
            team_mode: self.team_mode,
        }
    }

    /// Member connections in id order
    pub fn member_connections(&self) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self.members.keys().copied().collect();
        connections.sort();
        connections
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of removing a connection from its lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub lobby_id: LobbyId,
    /// The lobby had no members left and was removed
    pub destroyed: bool,
}

pub struct LobbyManager {
    lobbies: HashMap<LobbyId, Lobby>,
    membership: HashMap<ConnectionId, LobbyId>,
    rng: StdRng,
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyManager {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic lobby ids, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            lobbies: HashMap::new(),
            membership: HashMap::new(),
            rng,
        }
    }

    fn fresh_id(&mut self) -> LobbyId {
        loop {
            let id: LobbyId = self.rng.gen();
            if !self.lobbies.contains_key(&id) {
                return id;
            }
        }
    }

    /// Creates a lobby containing only `connection` and returns its id
    pub fn create_lobby(&mut self, connection: ConnectionId, client: ClientInfo) -> LobbyId {
        self.leave_lobby(connection);

        let id = self.fresh_id();
        let mut lobby = Lobby::new(id);
        lobby.members.insert(connection, Player::new(client));
        self.lobbies.insert(id, lobby);
        self.membership.insert(connection, id);

        info!("Lobby {} created by {}", id, connection);
        id
    }

    /// Ids of all live lobbies, ascending
    pub fn list_lobbies(&self) -> Vec<LobbyId> {
        let mut ids: Vec<LobbyId> = self.lobbies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Adds `connection` to lobby `id`, leaving its current lobby first
    ///
    /// Joining the lobby the connection is already in changes nothing. A
    /// missing lobby is reported without touching current membership.
    pub fn join_lobby(
        &mut self,
        id: LobbyId,
        connection: ConnectionId,
        client: ClientInfo,
    ) -> Result<(), LobbyError> {
        if !self.lobbies.contains_key(&id) {
            return Err(LobbyError::NoSuchLobby(id));
        }
        if self.membership.get(&connection) == Some(&id) {
            return Ok(());
        }

        self.leave_lobby(connection);

        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(LobbyError::NoSuchLobby(id))?;
        lobby.members.insert(connection, Player::new(client));
        self.membership.insert(connection, id);

        info!("{} joined lobby {} ({} members)", connection, id, lobby.len());
        Ok(())
    }

    /// Removes `connection` from its lobby, destroying the lobby if it
    /// became empty. Returns None if the connection was in no lobby.
    pub fn leave_lobby(&mut self, connection: ConnectionId) -> Option<LeaveOutcome> {
        let lobby_id = self.membership.remove(&connection)?;

        let destroyed = match self.lobbies.get_mut(&lobby_id) {
            Some(lobby) => {
                lobby.members.remove(&connection);
                info!("{} left lobby {} ({} members)", connection, lobby_id, lobby.len());
                lobby.is_empty()
            }
            None => false,
        };

        if destroyed {
            self.lobbies.remove(&lobby_id);
            info!("Lobby {} destroyed", lobby_id);
        }

        Some(LeaveOutcome {
            lobby_id,
            destroyed,
        })
    }

    pub fn set_metadata(
        &mut self,
        id: LobbyId,
        map: GameMap,
        team_mode: TeamMode,
    ) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(&id).ok_or(LobbyError::NoSuchLobby(id))?;
        lobby.map = map;
        lobby.team_mode = team_mode;

        info!(
            "Lobby {} set to map {} with team mode {:?}",
            id,
            map.name(),
            team_mode
        );
        Ok(())
    }

    pub fn metadata(&self, id: LobbyId) -> Result<LobbyData, LobbyError> {
        self.lobbies
            .get(&id)
            .map(Lobby::data)
            .ok_or(LobbyError::NoSuchLobby(id))
    }

    pub fn lobby(&self, id: LobbyId) -> Option<&Lobby> {
        self.lobbies.get(&id)
    }

    pub fn lobby_of(&self, connection: ConnectionId) -> Option<LobbyId> {
        self.membership.get(&connection).copied()
    }

    /// Ids of lobbies whose member count is at least `quorum`, ascending
    pub fn lobbies_at_quorum(&self, quorum: usize) -> Vec<LobbyId> {
        let mut ready: Vec<LobbyId> = self
            .lobbies
            .values()
            .filter(|lobby| lobby.len() >= quorum)
            .map(|lobby| lobby.id)
            .collect();
        ready.sort_unstable();
        ready
    }

    /// Removes a lobby and every membership entry pointing at it
    pub fn take_lobby(&mut self, id: LobbyId) -> Option<Lobby> {
        let lobby = self.lobbies.remove(&id)?;
        for connection in lobby.members.keys() {
            self.membership.remove(connection);
        }
        Some(lobby)
    }

    /// Keeps a member's lobby record in step with a rename
    pub fn rename_member(&mut self, connection: ConnectionId, nickname: &Nickname) {
        let lobby_id = match self.membership.get(&connection) {
            Some(id) => *id,
            None => return,
        };
        if let Some(player) = self
            .lobbies
            .get_mut(&lobby_id)
            .and_then(|lobby| lobby.members.get_mut(&connection))
        {
            player.client.nickname = nickname.clone();
        }
    }

    /// Logs every lobby with its members, map and team mode
    pub fn log_lobbies(&self) {
        if self.lobbies.is_empty() {
            info!("No lobbies");
            return;
        }

        info!("{} lobbies:", self.lobbies.len());
        for id in self.list_lobbies() {
            let lobby = match self.lobbies.get(&id) {
                Some(lobby) => lobby,
                None => continue,
            };
            info!(
                "Lobby {}: map {}, team mode {:?}, {} members",
                id,
                lobby.map.name(),
                lobby.team_mode,
                lobby.len()
            );
            for connection in lobby.member_connections() {
                if let Some(player) = lobby.members.get(&connection) {
                    info!("    {} {}", connection, player.client.nickname);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    pub fn clear(&mut self) {
        self.lobbies.clear();
        self.membership.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(name: &str) -> ClientInfo {
        ClientInfo::new(name)
    }

    fn conn(id: u32) -> ConnectionId {
        ConnectionId(id)
    }

    #[test]
    fn test_create_lobby_contains_only_creator() {
        let mut lobbies = LobbyManager::with_seed(1);
        let id = lobbies.create_lobby(conn(1), client("a"));

        let lobby = lobbies.lobby(id).unwrap();
        assert_eq!(lobby.member_connections(), vec![conn(1)]);
        assert_eq!(lobby.map, GameMap::Unset);
        assert_eq!(lobby.team_mode, TeamMode::Unset);
        assert_eq!(lobbies.lobby_of(conn(1)), Some(id));
        assert_eq!(lobbies.list_lobbies(), vec![id]);
    }

    #[test]
    fn test_lobby_ids_are_unique() {
        let mut lobbies = LobbyManager::with_seed(2);
        let mut seen = std::collections::HashSet::new();

        for i in 0..500 {
            let id = lobbies.create_lobby(conn(i), client("x"));
            assert!(seen.insert(id));
        }
        assert_eq!(lobbies.len(), 500);
    }

    #[test]
    fn test_creating_again_leaves_old_lobby() {
        let mut lobbies = LobbyManager::with_seed(3);
        let first = lobbies.create_lobby(conn(1), client("a"));
        let second = lobbies.create_lobby(conn(1), client("a"));

        assert_ne!(first, second);
        assert!(lobbies.lobby(first).is_none());
        assert_eq!(lobbies.list_lobbies(), vec![second]);
    }

    #[test]
    fn test_join_and_switch_lobbies() {
        let mut lobbies = LobbyManager::with_seed(4);
        let a = lobbies.create_lobby(conn(1), client("a"));
        let b = lobbies.create_lobby(conn(2), client("b"));
        lobbies.join_lobby(a, conn(3), client("c")).unwrap();

        assert_eq!(lobbies.lobby(a).unwrap().len(), 2);

        lobbies.join_lobby(b, conn(3), client("c")).unwrap();
        assert_eq!(lobbies.lobby(a).unwrap().len(), 1);
        assert_eq!(lobbies.lobby(b).unwrap().len(), 2);
        assert_eq!(lobbies.lobby_of(conn(3)), Some(b));
    }

    #[test]
    fn test_join_same_lobby_is_noop() {
        let mut lobbies = LobbyManager::with_seed(5);
        let id = lobbies.create_lobby(conn(1), client("a"));

        lobbies.join_lobby(id, conn(1), client("a")).unwrap();
        assert_eq!(lobbies.lobby(id).unwrap().len(), 1);
        assert_eq!(lobbies.lobby_of(conn(1)), Some(id));
    }

    #[test]
    fn test_join_missing_lobby_keeps_membership() {
        let mut lobbies = LobbyManager::with_seed(6);
        let id = lobbies.create_lobby(conn(1), client("a"));
        let missing = id.wrapping_add(1);

        assert_eq!(
            lobbies.join_lobby(missing, conn(1), client("a")),
            Err(LobbyError::NoSuchLobby(missing))
        );
        assert_eq!(lobbies.lobby_of(conn(1)), Some(id));
    }

    #[test]
    fn test_last_leave_destroys_lobby() {
        let mut lobbies = LobbyManager::with_seed(7);
        let id = lobbies.create_lobby(conn(1), client("a"));
        lobbies.join_lobby(id, conn(2), client("b")).unwrap();

        assert_eq!(
            lobbies.leave_lobby(conn(1)),
            Some(LeaveOutcome {
                lobby_id: id,
                destroyed: false
            })
        );
        assert_eq!(
            lobbies.leave_lobby(conn(2)),
            Some(LeaveOutcome {
                lobby_id: id,
                destroyed: true
            })
        );
        assert!(lobbies.is_empty());
        assert_eq!(lobbies.leave_lobby(conn(2)), None);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut lobbies = LobbyManager::with_seed(8);
        let id = lobbies.create_lobby(conn(1), client("a"));

        lobbies
            .set_metadata(id, GameMap::DmOverwatch, TeamMode::On)
            .unwrap();
        let data = lobbies.metadata(id).unwrap();
        assert_eq!(data.lobby_id, id);
        assert_eq!(data.map, GameMap::DmOverwatch);
        assert_eq!(data.team_mode, TeamMode::On);

        let missing = id.wrapping_add(1);
        assert_eq!(lobbies.metadata(missing), Err(LobbyError::NoSuchLobby(missing)));
        assert!(lobbies
            .set_metadata(missing, GameMap::Halls3, TeamMode::Off)
            .is_err());
    }

    #[test]
    fn test_quorum_uses_at_least() {
        let mut lobbies = LobbyManager::with_seed(9);
        let small = lobbies.create_lobby(conn(1), client("a"));
        let big = lobbies.create_lobby(conn(2), client("b"));
        lobbies.join_lobby(big, conn(3), client("c")).unwrap();
        lobbies.join_lobby(big, conn(4), client("d")).unwrap();

        assert_eq!(lobbies.lobbies_at_quorum(2), vec![big]);
        assert_eq!(lobbies.lobbies_at_quorum(3), vec![big]);
        assert!(lobbies.lobbies_at_quorum(4).is_empty());

        let mut both = vec![small, big];
        both.sort_unstable();
        assert_eq!(lobbies.lobbies_at_quorum(1), both);
    }

    #[test]
    fn test_take_lobby_clears_membership() {
        let mut lobbies = LobbyManager::with_seed(10);
        let id = lobbies.create_lobby(conn(1), client("a"));
        lobbies.join_lobby(id, conn(2), client("b")).unwrap();

        let lobby = lobbies.take_lobby(id).unwrap();
        assert_eq!(lobby.member_connections(), vec![conn(1), conn(2)]);
        assert!(lobbies.list_lobbies().is_empty());
        assert_eq!(lobbies.lobby_of(conn(1)), None);
        assert_eq!(lobbies.lobby_of(conn(2)), None);
        assert!(lobbies.take_lobby(id).is_none());
    }

    #[test]
    fn test_rename_member() {
        let mut lobbies = LobbyManager::with_seed(11);
        let id = lobbies.create_lobby(conn(1), client("a"));

        lobbies.rename_member(conn(1), &"Freeman".into());
        lobbies.rename_member(conn(9), &"Nobody".into());
        let player = &lobbies.lobby(id).unwrap().members[&conn(1)];
        assert_eq!(player.client.nickname, "Freeman");
        assert!(!player.is_opponent);
    }

    #[test]
    fn test_lobby_exists_iff_members() {
        let mut lobbies = LobbyManager::with_seed(12);
        let mut rng = StdRng::seed_from_u64(99);

        for step in 0..2000u32 {
            let connection = conn(rng.gen_range(0..8));
            match rng.gen_range(0..3) {
                0 => {
                    lobbies.create_lobby(connection, client("p"));
                }
                1 => {
                    if let Some(&id) = lobbies.list_lobbies().first() {
                        lobbies.join_lobby(id, connection, client("p")).unwrap();
                    }
                }
                _ => {
                    lobbies.leave_lobby(connection);
                }
            }

            for id in lobbies.list_lobbies() {
                assert!(!lobbies.lobby(id).unwrap().is_empty(), "empty lobby at step {}", step);
            }
            for c in 0..8 {
                if let Some(id) = lobbies.lobby_of(conn(c)) {
                    assert!(lobbies.lobby(id).unwrap().members.contains_key(&conn(c)));
                }
            }
        }
    }
}
