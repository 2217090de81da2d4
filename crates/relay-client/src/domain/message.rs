//! Chat line handling.
//!
//! Outgoing: a typed line is classified ([`parse_input`]); a chat line becomes
//! `"<username>: <line>"` ([`compose_message`]) and goes out newline-terminated
//! ([`encode_outgoing`]).
//!
//! Incoming: bytes are shown as received, minus one trailing terminator
//! ([`decode_incoming`]).  The relay does not frame messages, so one receive
//! may hold part of a line or several lines; no attempt is made to regroup
//! them.

use relay_core::{strip_terminator, QUIT_SENTINEL};

/// What the user typed, after the line ending is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// Exactly `quit`: send the sentinel and end the session.
    Quit,
    /// Ordinary chat text.
    Message(String),
    /// Nothing but whitespace; not sent.
    Blank,
}

/// Classifies one line of local input.
///
/// Only the line ending is removed.  `" quit"` or `"quit "` is chat text.
pub fn parse_input(line: &str) -> InputLine {
    let line = line
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line);

    if line == QUIT_SENTINEL {
        InputLine::Quit
    } else if line.trim().is_empty() {
        InputLine::Blank
    } else {
        InputLine::Message(line.to_owned())
    }
}

/// Formats a chat line as `"<username>: <text>"`.
pub fn compose_message(username: &str, text: &str) -> String {
    format!("{username}: {text}")
}

/// Wire form of an outgoing message: the text plus a newline.
pub fn encode_outgoing(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Display form of received bytes.  Invalid UTF-8 is replaced, not rejected.
pub fn decode_incoming(bytes: &[u8]) -> String {
    String::from_utf8_lossy(strip_terminator(bytes)).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_quit() {
        assert_eq!(parse_input("quit"), InputLine::Quit);
        assert_eq!(parse_input("quit\n"), InputLine::Quit);
        assert_eq!(parse_input("quit\r\n"), InputLine::Quit);
    }

    #[test]
    fn test_parse_input_padded_quit_is_chat() {
        assert_eq!(parse_input("quit "), InputLine::Message("quit ".into()));
        assert_eq!(parse_input("QUIT"), InputLine::Message("QUIT".into()));
    }

    #[test]
    fn test_parse_input_blank_lines() {
        assert_eq!(parse_input(""), InputLine::Blank);
        assert_eq!(parse_input("   \n"), InputLine::Blank);
    }

    #[test]
    fn test_compose_message_prefixes_username() {
        assert_eq!(compose_message("alice", "hi"), "alice: hi");
    }

    #[test]
    fn test_encode_outgoing_appends_newline() {
        assert_eq!(encode_outgoing("alice: hi"), b"alice: hi\n");
    }

    #[test]
    fn test_decode_incoming_strips_one_terminator() {
        assert_eq!(decode_incoming(b"bob: yo\0"), "bob: yo");
        assert_eq!(decode_incoming(b"bob: yo\r\n"), "bob: yo");
        assert_eq!(decode_incoming(b"a\nb\n"), "a\nb");
    }

    #[test]
    fn test_decode_incoming_replaces_invalid_utf8() {
        assert_eq!(decode_incoming(&[b'h', 0xff, b'i']), "h\u{fffd}i");
    }
}
