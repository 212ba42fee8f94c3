//! Matchmaking wire protocol
//!
//! Every application message is a single tag byte followed by its payload.
//! There is no length prefix: the transport is message oriented and already
//! delimits messages. Structured payloads are fixed-layout records of
//! native-endian fields, so both ends must be built from the same definitions.

use crate::error::ProtocolError;

/// Identifier of a lobby, unique among the lobbies currently alive
pub type LobbyId = u32;

const LOBBY_ID_LEN: usize = std::mem::size_of::<LobbyId>();

/// Size of an encoded [`LobbyData`] record, including trailing padding
pub const LOBBY_DATA_LEN: usize = 12;

/// Smallest payload accepted as a [`LobbyData`] record (no padding)
pub const LOBBY_DATA_MIN_LEN: usize = 9;

/// One-byte discriminator of a message. Ordinals are part of the wire format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Chat = 0,
    RequestLobbyList = 1,
    LobbyList = 2,
    LobbyData = 3,
    RequestCreateLobby = 4,
    RequestJoinLobby = 5,
    RequestLeaveLobby = 6,
    RequestLobbyData = 7,
    LobbyIdAssignedOnJoin = 8,
    LobbyIdAssignedOnCreate = 9,
    NoSuitableLobbies = 10,
    StartGame = 11,
    RequestEcho = 12,
    EchoReply = 13,
}

impl MessageTag {
    pub const ALL: [MessageTag; 14] = [
        MessageTag::Chat,
        MessageTag::RequestLobbyList,
        MessageTag::LobbyList,
        MessageTag::LobbyData,
        MessageTag::RequestCreateLobby,
        MessageTag::RequestJoinLobby,
        MessageTag::RequestLeaveLobby,
        MessageTag::RequestLobbyData,
        MessageTag::LobbyIdAssignedOnJoin,
        MessageTag::LobbyIdAssignedOnCreate,
        MessageTag::NoSuitableLobbies,
        MessageTag::StartGame,
        MessageTag::RequestEcho,
        MessageTag::EchoReply,
    ];

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageTag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        MessageTag::ALL
            .get(byte as usize)
            .copied()
            .ok_or(ProtocolError::UnknownTag(byte))
    }
}

/// Prepends the tag byte to `payload`
pub fn encode(tag: MessageTag, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 1);
    bytes.push(tag.as_byte());
    bytes.extend_from_slice(payload);
    bytes
}

/// Splits a message into its tag and payload
pub fn decode(bytes: &[u8]) -> Result<(MessageTag, &[u8]), ProtocolError> {
    let (&first, payload) = bytes.split_first().ok_or(ProtocolError::Empty)?;
    Ok((MessageTag::try_from(first)?, payload))
}

/// Reads only the tag of a message
pub fn decode_tag_only(bytes: &[u8]) -> Result<MessageTag, ProtocolError> {
    let first = bytes.first().ok_or(ProtocolError::Empty)?;
    MessageTag::try_from(*first)
}

/// Maps a lobby can be launched on. Ordinals are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameMap {
    DmLockdown,
    DmOverwatch,
    DmPowerhouse,
    DmResistance,
    DmRunoff,
    DmSteamlab,
    DmUnderpass,
    Halls3,
    #[default]
    Unset,
}

impl GameMap {
    /// Every map a match can actually be played on
    pub const PLAYABLE: [GameMap; 8] = [
        GameMap::DmLockdown,
        GameMap::DmOverwatch,
        GameMap::DmPowerhouse,
        GameMap::DmResistance,
        GameMap::DmRunoff,
        GameMap::DmSteamlab,
        GameMap::DmUnderpass,
        GameMap::Halls3,
    ];

    pub fn ordinal(self) -> i32 {
        match self {
            GameMap::DmLockdown => 0,
            GameMap::DmOverwatch => 1,
            GameMap::DmPowerhouse => 2,
            GameMap::DmResistance => 3,
            GameMap::DmRunoff => 4,
            GameMap::DmSteamlab => 5,
            GameMap::DmUnderpass => 6,
            GameMap::Halls3 => 7,
            GameMap::Unset => 8,
        }
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            8 => Some(GameMap::Unset),
            n if (0..8).contains(&n) => Some(GameMap::PLAYABLE[n as usize]),
            _ => None,
        }
    }

    /// Level name as understood by the game server's `changelevel`
    pub fn name(self) -> &'static str {
        match self {
            GameMap::DmLockdown => "dm_lockdown",
            GameMap::DmOverwatch => "dm_overwatch",
            GameMap::DmPowerhouse => "dm_powerhouse",
            GameMap::DmResistance => "dm_resistance",
            GameMap::DmRunoff => "dm_runoff",
            GameMap::DmSteamlab => "dm_steamlab",
            GameMap::DmUnderpass => "dm_underpass",
            GameMap::Halls3 => "halls3",
            GameMap::Unset => "unset",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        GameMap::PLAYABLE
            .iter()
            .chain(std::iter::once(&GameMap::Unset))
            .copied()
            .find(|map| map.name().eq_ignore_ascii_case(name))
    }
}

/// Tri-state team deathmatch flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TeamMode {
    #[default]
    Unset,
    Off,
    On,
}

impl TeamMode {
    pub fn to_wire(self) -> i8 {
        match self {
            TeamMode::Unset => -1,
            TeamMode::Off => 0,
            TeamMode::On => 1,
        }
    }

    /// Any positive byte means enabled, any negative byte means unset
    pub fn from_wire(value: i8) -> Self {
        match value {
            0 => TeamMode::Off,
            v if v > 0 => TeamMode::On,
            _ => TeamMode::Unset,
        }
    }
}

impl From<bool> for TeamMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            TeamMode::On
        } else {
            TeamMode::Off
        }
    }
}

/// Lobby metadata record exchanged in both directions
///
/// Layout: `lobby_id: u32`, `map: i32`, `team_mode: i8`, then three zero
/// bytes of padding so the record matches a naturally aligned C struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyData {
    pub lobby_id: LobbyId,
    pub map: GameMap,
    pub team_mode: TeamMode,
}

impl LobbyData {
    pub fn to_bytes(&self) -> [u8; LOBBY_DATA_LEN] {
        let mut bytes = [0u8; LOBBY_DATA_LEN];
        bytes[0..4].copy_from_slice(&self.lobby_id.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.map.ordinal().to_ne_bytes());
        bytes[8] = self.team_mode.to_wire().to_ne_bytes()[0];
        bytes
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < LOBBY_DATA_MIN_LEN || payload.len() > LOBBY_DATA_LEN {
            return Err(ProtocolError::PayloadLength {
                tag: MessageTag::LobbyData,
                len: payload.len(),
            });
        }

        let lobby_id = read_u32(&payload[0..4]);
        let ordinal = i32::from_ne_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let map = GameMap::from_ordinal(ordinal).ok_or(ProtocolError::UnknownMap(ordinal))?;
        let team_mode = TeamMode::from_wire(i8::from_ne_bytes([payload[8]]));

        Ok(Self {
            lobby_id,
            map,
            team_mode,
        })
    }
}

/// A decoded application message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Raw chat bytes, relayed without any text decoding
    Chat(Vec<u8>),
    RequestLobbyList,
    LobbyList(Vec<LobbyId>),
    LobbyData(LobbyData),
    RequestCreateLobby,
    RequestJoinLobby(LobbyId),
    RequestLeaveLobby,
    RequestLobbyData(LobbyId),
    LobbyIdAssignedOnJoin(LobbyId),
    LobbyIdAssignedOnCreate(LobbyId),
    NoSuitableLobbies,
    StartGame(String),
    RequestEcho(u32),
    EchoReply(u32),
}

impl Message {
    pub fn chat(text: impl Into<Vec<u8>>) -> Self {
        Message::Chat(text.into())
    }

    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Chat(_) => MessageTag::Chat,
            Message::RequestLobbyList => MessageTag::RequestLobbyList,
            Message::LobbyList(_) => MessageTag::LobbyList,
            Message::LobbyData(_) => MessageTag::LobbyData,
            Message::RequestCreateLobby => MessageTag::RequestCreateLobby,
            Message::RequestJoinLobby(_) => MessageTag::RequestJoinLobby,
            Message::RequestLeaveLobby => MessageTag::RequestLeaveLobby,
            Message::RequestLobbyData(_) => MessageTag::RequestLobbyData,
            Message::LobbyIdAssignedOnJoin(_) => MessageTag::LobbyIdAssignedOnJoin,
            Message::LobbyIdAssignedOnCreate(_) => MessageTag::LobbyIdAssignedOnCreate,
            Message::NoSuitableLobbies => MessageTag::NoSuitableLobbies,
            Message::StartGame(_) => MessageTag::StartGame,
            Message::RequestEcho(_) => MessageTag::RequestEcho,
            Message::EchoReply(_) => MessageTag::EchoReply,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        match self {
            Message::Chat(bytes) => encode(tag, bytes),
            Message::StartGame(text) => encode(tag, text.as_bytes()),
            Message::LobbyList(ids) => {
                let payload: Vec<u8> = ids.iter().flat_map(|id| id.to_ne_bytes()).collect();
                encode(tag, &payload)
            }
            Message::LobbyData(data) => encode(tag, &data.to_bytes()),
            Message::RequestJoinLobby(id)
            | Message::RequestLobbyData(id)
            | Message::LobbyIdAssignedOnJoin(id)
            | Message::LobbyIdAssignedOnCreate(id)
            | Message::RequestEcho(id)
            | Message::EchoReply(id) => encode(tag, &id.to_ne_bytes()),
            Message::RequestLobbyList
            | Message::RequestCreateLobby
            | Message::RequestLeaveLobby
            | Message::NoSuitableLobbies => encode(tag, &[]),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (tag, payload) = decode(bytes)?;
        let bad_length = || ProtocolError::PayloadLength {
            tag,
            len: payload.len(),
        };

        let message = match tag {
            MessageTag::Chat => Message::Chat(payload.to_vec()),
            MessageTag::StartGame => {
                Message::StartGame(String::from_utf8_lossy(payload).into_owned())
            }
            MessageTag::LobbyList => {
                if payload.len() % LOBBY_ID_LEN != 0 {
                    return Err(bad_length());
                }
                Message::LobbyList(payload.chunks_exact(LOBBY_ID_LEN).map(read_u32).collect())
            }
            MessageTag::LobbyData => Message::LobbyData(LobbyData::from_bytes(payload)?),
            MessageTag::RequestJoinLobby
            | MessageTag::RequestLobbyData
            | MessageTag::LobbyIdAssignedOnJoin
            | MessageTag::LobbyIdAssignedOnCreate
            | MessageTag::RequestEcho
            | MessageTag::EchoReply => {
                if payload.len() != LOBBY_ID_LEN {
                    return Err(bad_length());
                }
                let value = read_u32(payload);
                match tag {
                    MessageTag::RequestJoinLobby => Message::RequestJoinLobby(value),
                    MessageTag::RequestLobbyData => Message::RequestLobbyData(value),
                    MessageTag::LobbyIdAssignedOnJoin => Message::LobbyIdAssignedOnJoin(value),
                    MessageTag::LobbyIdAssignedOnCreate => Message::LobbyIdAssignedOnCreate(value),
                    MessageTag::RequestEcho => Message::RequestEcho(value),
                    _ => Message::EchoReply(value),
                }
            }
            MessageTag::RequestLobbyList
            | MessageTag::RequestCreateLobby
            | MessageTag::RequestLeaveLobby
            | MessageTag::NoSuitableLobbies => {
                if !payload.is_empty() {
                    return Err(bad_length());
                }
                match tag {
                    MessageTag::RequestLobbyList => Message::RequestLobbyList,
                    MessageTag::RequestCreateLobby => Message::RequestCreateLobby,
                    MessageTag::RequestLeaveLobby => Message::RequestLeaveLobby,
                    _ => Message::NoSuitableLobbies,
                }
            }
        };

        Ok(message)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_ordinals_are_stable() {
        assert_eq!(MessageTag::Chat.as_byte(), 0);
        assert_eq!(MessageTag::LobbyData.as_byte(), 3);
        assert_eq!(MessageTag::LobbyIdAssignedOnCreate.as_byte(), 9);
        assert_eq!(MessageTag::NoSuitableLobbies.as_byte(), 10);
        assert_eq!(MessageTag::EchoReply.as_byte(), 13);

        for (ordinal, tag) in MessageTag::ALL.iter().enumerate() {
            assert_eq!(tag.as_byte() as usize, ordinal);
        }
    }

    #[test]
    fn test_raw_envelope_roundtrip() {
        let long_payload: Vec<u8> = (0..=255u8).collect();

        for tag in MessageTag::ALL {
            let empty = encode(tag, &[]);
            assert_eq!(empty.len(), 1);
            assert_eq!(decode(&empty).unwrap(), (tag, &[][..]));

            let full = encode(tag, &long_payload);
            assert_eq!(decode(&full).unwrap(), (tag, &long_payload[..]));
            assert_eq!(decode_tag_only(&full).unwrap(), tag);
        }
    }

    #[test]
    fn test_decode_rejects_empty_and_unknown_tags() {
        assert_eq!(decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(decode_tag_only(&[]), Err(ProtocolError::Empty));
        assert_eq!(decode(&[14]), Err(ProtocolError::UnknownTag(14)));
        assert_eq!(decode_tag_only(&[0xFF, 1]), Err(ProtocolError::UnknownTag(0xFF)));
    }

    #[test]
    fn test_chat_is_not_null_terminated() {
        let bytes = Message::chat("hello").encode();
        assert_eq!(bytes, vec![0, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_chat_keeps_non_utf8_bytes() {
        let bytes = vec![0, b'c', b'a', b'f', 0xE9];
        let message = Message::decode(&bytes).unwrap();
        assert_eq!(message, Message::Chat(vec![b'c', b'a', b'f', 0xE9]));
        assert_eq!(message.encode(), bytes);
    }

    #[test]
    fn test_lobby_list_layout() {
        let bytes = Message::LobbyList(vec![7, 42]).encode();
        assert_eq!(bytes.len(), 1 + 8);
        assert_eq!(bytes[0], MessageTag::LobbyList.as_byte());
        assert_eq!(&bytes[1..5], &7u32.to_ne_bytes());
        assert_eq!(&bytes[5..9], &42u32.to_ne_bytes());

        assert_eq!(Message::decode(&bytes).unwrap(), Message::LobbyList(vec![7, 42]));
    }

    #[test]
    fn test_lobby_list_rejects_partial_ids() {
        let mut bytes = Message::LobbyList(vec![1]).encode();
        bytes.push(0);
        assert_eq!(
            Message::decode(&bytes),
            Err(ProtocolError::PayloadLength {
                tag: MessageTag::LobbyList,
                len: 5
            })
        );
    }

    #[test]
    fn test_lobby_data_record_layout() {
        let data = LobbyData {
            lobby_id: 0x0102_0304,
            map: GameMap::Halls3,
            team_mode: TeamMode::On,
        };
        let bytes = data.to_bytes();

        assert_eq!(bytes.len(), LOBBY_DATA_LEN);
        assert_eq!(&bytes[0..4], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_ne_bytes());
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..], &[0, 0, 0]);
        assert_eq!(LobbyData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_lobby_data_accepts_unpadded_record() {
        let data = LobbyData {
            lobby_id: 99,
            map: GameMap::DmRunoff,
            team_mode: TeamMode::Unset,
        };
        let bytes = data.to_bytes();

        assert_eq!(LobbyData::from_bytes(&bytes[..LOBBY_DATA_MIN_LEN]).unwrap(), data);
        assert!(LobbyData::from_bytes(&bytes[..8]).is_err());
    }

    #[test]
    fn test_lobby_data_rejects_unknown_map() {
        let mut bytes = LobbyData {
            lobby_id: 1,
            map: GameMap::DmLockdown,
            team_mode: TeamMode::Off,
        }
        .to_bytes();
        bytes[4..8].copy_from_slice(&42i32.to_ne_bytes());

        assert_eq!(LobbyData::from_bytes(&bytes), Err(ProtocolError::UnknownMap(42)));
    }

    #[test]
    fn test_fixed_width_messages_check_length() {
        let short = encode(MessageTag::RequestJoinLobby, &[1, 2]);
        assert!(matches!(
            Message::decode(&short),
            Err(ProtocolError::PayloadLength { len: 2, .. })
        ));

        let padded = encode(MessageTag::RequestLeaveLobby, &[0]);
        assert!(Message::decode(&padded).is_err());
    }

    #[test]
    fn test_typed_messages_roundtrip() {
        let messages = vec![
            Message::chat("gl hf"),
            Message::Chat(Vec::new()),
            Message::RequestLobbyList,
            Message::LobbyList(vec![]),
            Message::LobbyData(LobbyData {
                lobby_id: 5,
                map: GameMap::DmSteamlab,
                team_mode: TeamMode::Off,
            }),
            Message::RequestCreateLobby,
            Message::RequestJoinLobby(12),
            Message::RequestLeaveLobby,
            Message::RequestLobbyData(12),
            Message::LobbyIdAssignedOnJoin(u32::MAX),
            Message::LobbyIdAssignedOnCreate(0),
            Message::NoSuitableLobbies,
            Message::StartGame("10.0.0.1:27015".to_string()),
            Message::RequestEcho(432000),
            Message::EchoReply(432000),
        ];

        for message in messages {
            let bytes = message.encode();
            assert_eq!(decode_tag_only(&bytes).unwrap(), message.tag());
            assert_eq!(Message::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_map_names_and_ordinals() {
        assert_eq!(GameMap::default(), GameMap::Unset);
        assert_eq!(GameMap::Unset.ordinal(), 8);
        assert_eq!(GameMap::from_ordinal(0), Some(GameMap::DmLockdown));
        assert_eq!(GameMap::from_ordinal(9), None);
        assert_eq!(GameMap::from_ordinal(-1), None);
        assert_eq!(GameMap::from_name("DM_UNDERPASS"), Some(GameMap::DmUnderpass));
        assert_eq!(GameMap::from_name("de_dust"), None);

        for map in GameMap::PLAYABLE {
            assert_eq!(GameMap::from_ordinal(map.ordinal()), Some(map));
            assert_eq!(GameMap::from_name(map.name()), Some(map));
        }
    }

    #[test]
    fn test_team_mode_wire_values() {
        assert_eq!(TeamMode::default().to_wire(), -1);
        assert_eq!(TeamMode::from_wire(0), TeamMode::Off);
        assert_eq!(TeamMode::from_wire(1), TeamMode::On);
        assert_eq!(TeamMode::from_wire(7), TeamMode::On);
        assert_eq!(TeamMode::from_wire(-1), TeamMode::Unset);
        assert_eq!(TeamMode::from(true), TeamMode::On);
    }
}
