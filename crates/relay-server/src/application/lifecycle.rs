//! Lifecycle controller: admission, receive classification, and retirement.
//!
//! Both dispatch strategies run every connection through the same three steps,
//! and the rules for each step live here so the strategies cannot drift apart:
//!
//! ```text
//!            accept
//!              │
//!          admit(peer) ──── Rejected ───► caller closes socket, never served
//!              │ Ok
//!              ▼
//!   ┌──► classify(recv result)
//!   │          │
//!   │   Message(n) ──► broadcast to everyone else
//!   └──────────┘
//!              │ Ended(reason)   (EOF, error, or "quit")
//!              ▼
//!        retire(id) ──► Some(peer) ──► caller closes it (exactly once)
//!                  └──► None       ──► someone else already did
//! ```
//!
//! Nothing here touches a socket.  Closing is transport-specific and stays
//! with the dispatcher that owns the stream.

use std::fmt;
use std::io;

use relay_core::{is_quit, ConnectionId, Peer, Registry, Rejected};
use tracing::{debug, info};

/// Why a dispatcher stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested through the server handle.
    ShutdownRequested,
    /// The last connection left (multiplexed mode only).
    Drained,
}

/// Why a single connection's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Zero-length receive: the peer closed its side.
    PeerClosed,
    /// The peer sent the `quit` sentinel.
    Quit,
    /// The receive call failed.
    Failed(io::ErrorKind),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::PeerClosed => f.write_str("peer closed the connection"),
            EndReason::Quit => f.write_str("peer sent quit"),
            EndReason::Failed(kind) => write!(f, "receive failed ({kind})"),
        }
    }
}

/// Result of one receive call, as seen by a dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    /// `n` bytes of payload are in the buffer; broadcast them.
    Message(usize),
    /// No data right now (`WouldBlock`); wait for the next readiness event.
    Pending,
    /// The call was interrupted by a signal; call it again.
    Retry,
    /// The session is over.
    Ended(EndReason),
}

/// Interprets the result of reading into `buf`.
///
/// The sentinel check looks at exactly the bytes of this receive.  A `quit`
/// that arrives glued to other text (stream coalescing) is ordinary payload.
pub fn classify(result: io::Result<usize>, buf: &[u8]) -> Receive {
    match result {
        Ok(0) => Receive::Ended(EndReason::PeerClosed),
        Ok(n) if is_quit(&buf[..n]) => Receive::Ended(EndReason::Quit),
        Ok(n) => Receive::Message(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Receive::Pending,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Receive::Retry,
        Err(e) => Receive::Ended(EndReason::Failed(e.kind())),
    }
}

/// Registers a freshly accepted peer.
///
/// A full registry is an expected condition, logged at `info`, not `error`.
///
/// # Errors
///
/// Hands the peer back inside [`Rejected`]; the caller must close it.
pub fn admit<P: Peer>(registry: &mut Registry<P>, peer: P) -> Result<(), Rejected<P>> {
    let id = peer.id();
    match registry.add(peer) {
        Ok(()) => {
            info!(%id, live = registry.size(), "client connected");
            Ok(())
        }
        Err(rejected) => {
            info!(%id, reason = %rejected.reason, "connection rejected");
            Err(rejected)
        }
    }
}

/// Deregisters `id` after its session ended.
///
/// Returns the peer only to the first caller; whoever receives `Some` is the
/// one that closes the socket.
pub fn retire<P: Peer>(
    registry: &mut Registry<P>,
    id: ConnectionId,
    reason: EndReason,
) -> Option<P> {
    let peer = registry.remove(id);
    if peer.is_some() {
        info!(%id, %reason, live = registry.size(), "client disconnected");
    } else {
        debug!(%id, %reason, "session ended for a connection no longer registered");
    }
    peer
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::mock::MockPeer;
    use relay_core::RejectReason;

    #[test]
    fn test_classify_zero_bytes_is_peer_closed() {
        assert_eq!(
            classify(Ok(0), &[]),
            Receive::Ended(EndReason::PeerClosed)
        );
    }

    #[test]
    fn test_classify_quit_sentinel_ends_session() {
        let buf = *b"quit\n";
        assert_eq!(classify(Ok(5), &buf), Receive::Ended(EndReason::Quit));
    }

    #[test]
    fn test_classify_only_looks_at_received_bytes() {
        // Stale bytes past `n` must not turn "qu" into "quit".
        let buf = *b"quit";
        assert_eq!(classify(Ok(2), &buf), Receive::Message(2));
    }

    #[test]
    fn test_classify_chat_line_is_message() {
        let buf = *b"alice: hi";
        assert_eq!(classify(Ok(buf.len()), &buf), Receive::Message(9));
    }

    #[test]
    fn test_classify_would_block_and_interrupted() {
        let wb = io::Error::new(io::ErrorKind::WouldBlock, "wb");
        let intr = io::Error::new(io::ErrorKind::Interrupted, "eintr");
        assert_eq!(classify(Err(wb), &[]), Receive::Pending);
        assert_eq!(classify(Err(intr), &[]), Receive::Retry);
    }

    #[test]
    fn test_classify_reset_is_failure() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            classify(Err(reset), &[]),
            Receive::Ended(EndReason::Failed(io::ErrorKind::ConnectionReset))
        );
    }

    #[test]
    fn test_admit_rejects_when_full() {
        // Arrange
        let mut registry = Registry::with_capacity(1);
        admit(&mut registry, MockPeer::new(ConnectionId::new(1))).unwrap();

        // Act
        let rejected = admit(&mut registry, MockPeer::new(ConnectionId::new(2))).unwrap_err();

        // Assert
        assert_eq!(rejected.reason, RejectReason::Full { capacity: 1 });
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_retire_returns_peer_exactly_once() {
        let mut registry = Registry::with_capacity(2);
        admit(&mut registry, MockPeer::new(ConnectionId::new(1))).unwrap();

        let first = retire(&mut registry, ConnectionId::new(1), EndReason::Quit);
        let second = retire(&mut registry, ConnectionId::new(1), EndReason::PeerClosed);

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_end_reason_display() {
        assert_eq!(EndReason::Quit.to_string(), "peer sent quit");
    }
}
