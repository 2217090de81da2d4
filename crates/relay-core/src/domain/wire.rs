//! Wire rules shared by server and client.
//!
//! The relay has no framing.  Whatever one `recv` returns is treated as one
//! message, up to [`RECV_BUFFER_SIZE`] bytes.  A long line therefore arrives
//! in several pieces, and two quick lines may arrive as one; the relay does
//! not try to repair either.
//!
//! The only control message is the `quit` sentinel.  Peers may terminate it
//! with a newline (typed input), CRLF, or a trailing NUL (C clients send
//! `strlen + 1` bytes), so exactly one such terminator is stripped before the
//! comparison.  Anything else, including `quit ` with a space or `QUIT`, is an
//! ordinary message.

/// Bytes requested from the transport by one receive call.
pub const RECV_BUFFER_SIZE: usize = 256;

/// Control text that ends a session.
pub const QUIT_SENTINEL: &str = "quit";

/// Strips one trailing message terminator: `\0`, `\n`, or `\r\n`.
pub fn strip_terminator(bytes: &[u8]) -> &[u8] {
    match bytes {
        [head @ .., b'\r', b'\n'] => head,
        [head @ .., b'\n'] | [head @ .., b'\0'] => head,
        _ => bytes,
    }
}

/// Returns `true` if `bytes` is exactly the `quit` sentinel.
pub fn is_quit(bytes: &[u8]) -> bool {
    strip_terminator(bytes) == QUIT_SENTINEL.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_quit_accepts_bare_and_terminated_forms() {
        assert!(is_quit(b"quit"));
        assert!(is_quit(b"quit\n"));
        assert!(is_quit(b"quit\r\n"));
        assert!(is_quit(b"quit\0"));
    }

    #[test]
    fn test_is_quit_rejects_near_misses() {
        assert!(!is_quit(b"QUIT"));
        assert!(!is_quit(b"quit "));
        assert!(!is_quit(b" quit"));
        assert!(!is_quit(b"quit\n\n"));
        assert!(!is_quit(b"alice: quit"));
        assert!(!is_quit(b""));
    }

    #[test]
    fn test_strip_terminator_removes_only_one() {
        assert_eq!(strip_terminator(b"hi\n\n"), b"hi\n");
        assert_eq!(strip_terminator(b"hi"), b"hi");
        assert_eq!(strip_terminator(b""), b"");
    }
}
