//! Chat command parsing and the text of every server-generated chat line
//!
//! Chat travels as raw bytes. Nicknames and relayed text are spliced into the
//! server's lines unchanged, whatever encoding the clients use.

use crate::client_manager::MAX_NICKNAME_LEN;

pub const NICK_COMMAND: &[u8] = b"/nick";

pub const FAREWELL: &str = "Server is shutting down. Goodbye.";
pub const ALONE: &str = "You are all alone.";
pub const NICK_USAGE: &str = "Usage: /nick <new name>";
pub const CHAT_TOO_LONG: &str = "Your message is too long and was not sent.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Rename(&'a [u8]),
    /// `/nick` without a name
    RenameUsage,
    /// `/nick` with a name longer than [`MAX_NICKNAME_LEN`]
    RenameTooLong,
    Say(&'a [u8]),
}

impl<'a> ChatCommand<'a> {
    pub fn parse(text: &'a [u8]) -> Self {
        let rest = match text.strip_prefix(NICK_COMMAND) {
            Some(rest) if rest.first().map_or(true, u8::is_ascii_whitespace) => rest,
            _ => return ChatCommand::Say(text),
        };

        match trim_ascii(rest) {
            [] => ChatCommand::RenameUsage,
            nickname if nickname.len() > MAX_NICKNAME_LEN => ChatCommand::RenameTooLong,
            nickname => ChatCommand::Rename(nickname),
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

pub fn nickname_too_long() -> Vec<u8> {
    format!("Nicknames are limited to {} bytes", MAX_NICKNAME_LEN).into_bytes()
}

pub fn welcome(nickname: &[u8]) -> Vec<u8> {
    concat(&[
        &b"Welcome, stranger. You are known to us for now as '"[..],
        nickname,
        &b"'; use '/nick <name>' to change it."[..],
    ])
}

pub fn companions(count: usize) -> Vec<u8> {
    format!("{} companions greet you:", count).into_bytes()
}

pub fn joined(nickname: &[u8]) -> Vec<u8> {
    concat(&[&b"A stranger has joined. For now we shall call them '"[..], nickname, &b"'"[..]])
}

pub fn renamed(old: &[u8], new: &[u8]) -> Vec<u8> {
    concat(&[old, &b" is now known as "[..], new])
}

pub fn rename_reply(new: &[u8]) -> Vec<u8> {
    concat(&[&b"You are now known as "[..], new])
}

pub fn left(nickname: &[u8]) -> Vec<u8> {
    concat(&[nickname, &b" has left"[..]])
}

pub fn lost(nickname: &[u8], reason: &str) -> Vec<u8> {
    concat(&[nickname, &b" was lost ("[..], reason.as_bytes(), &b")"[..]])
}

pub fn format_chat(nickname: &[u8], text: &[u8]) -> Vec<u8> {
    concat(&[nickname, &b": "[..], text])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rename() {
        assert_eq!(ChatCommand::parse(b"/nick Gordon"), ChatCommand::Rename(b"Gordon"));
        assert_eq!(
            ChatCommand::parse(b"/nick   Alyx Vance  "),
            ChatCommand::Rename(b"Alyx Vance")
        );
        assert_eq!(
            ChatCommand::parse(&[b'/', b'n', b'i', b'c', b'k', b' ', b'R', 0xE9]),
            ChatCommand::Rename(&[b'R', 0xE9])
        );
    }

    #[test]
    fn test_parse_rename_usage() {
        assert_eq!(ChatCommand::parse(b"/nick"), ChatCommand::RenameUsage);
        assert_eq!(ChatCommand::parse(b"/nick    "), ChatCommand::RenameUsage);
    }

    #[test]
    fn test_parse_rename_too_long() {
        let mut text = b"/nick ".to_vec();
        text.extend(std::iter::repeat(b'x').take(MAX_NICKNAME_LEN));
        assert!(matches!(ChatCommand::parse(&text), ChatCommand::Rename(_)));

        text.push(b'x');
        assert_eq!(ChatCommand::parse(&text), ChatCommand::RenameTooLong);
    }

    #[test]
    fn test_parse_plain_chat() {
        assert_eq!(ChatCommand::parse(b"hello"), ChatCommand::Say(b"hello"));
        assert_eq!(ChatCommand::parse(b"/nickname x"), ChatCommand::Say(b"/nickname x"));
        assert_eq!(ChatCommand::parse(b" /nick x"), ChatCommand::Say(b" /nick x"));
        assert_eq!(ChatCommand::parse(b""), ChatCommand::Say(b""));
    }

    #[test]
    fn test_text_builders() {
        assert_eq!(format_chat(b"Player12345", b"gg"), b"Player12345: gg");
        assert_eq!(format_chat(b"a", &[b'c', 0xE9]), vec![b'a', b':', b' ', b'c', 0xE9]);
        assert_eq!(renamed(b"a", b"b"), b"a is now known as b");
        assert_eq!(rename_reply(b"b"), b"You are now known as b");
        assert_eq!(left(b"a"), b"a has left");
        assert_eq!(lost(b"a", "Timed out"), b"a was lost (Timed out)");
        assert!(welcome(b"Player10000")
            .windows(13)
            .any(|window| window == b"'Player10000'"));
        assert_eq!(companions(2), b"2 companions greet you:");
    }
}
