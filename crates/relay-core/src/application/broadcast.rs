//! Broadcast engine: best-effort fan-out of one message.
//!
//! ```text
//! broadcast(recipients, "hi", sender = B)
//!
//!   A ◄── "hi"      delivered
//!   B               skipped (sender)
//!   C ◄── "hi"  ✗   failed: logged, loop continues
//!   D ◄── "hi"      delivered
//! ```
//!
//! # Failure policy
//!
//! A failed send is logged at `warn` and recorded in the [`BroadcastReport`].
//! The failing recipient is **not** removed here.  It stays registered until
//! its own receive path (a worker thread or a readiness slot) sees the EOF or
//! error and deregisters it.  Keeping removal in one place means a connection
//! is only ever closed by the code that owns its receive side.
//!
//! # Locking
//!
//! The engine takes any iterator of peers.  Whether that iterator borrows a
//! registry under a held lock or walks a snapshot taken earlier is the
//! caller's decision; see the threaded dispatcher's lock policy.

use tracing::{debug, warn};

use crate::domain::connection::{ConnectionId, Peer};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the message was written to, in iteration order.
    pub delivered: Vec<ConnectionId>,
    /// Recipients whose send failed.
    pub failed: Vec<ConnectionId>,
}

impl BroadcastReport {
    /// Number of recipients that received the message.
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// `true` if no send failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends `message` to every peer in `recipients` except `sender`.
///
/// The message is forwarded byte for byte; nothing is framed or rewritten.
/// An empty message is still forwarded, although the dispatchers never
/// produce one (a zero-length receive means end of stream).
pub fn broadcast<'a, P, I>(recipients: I, message: &[u8], sender: ConnectionId) -> BroadcastReport
where
    P: Peer + 'a,
    I: IntoIterator<Item = &'a P>,
{
    let mut report = BroadcastReport::default();

    for peer in recipients {
        let id = peer.id();
        if id == sender {
            continue;
        }
        match peer.send(message) {
            Ok(()) => report.delivered.push(id),
            Err(e) => {
                warn!(%sender, recipient = %id, "broadcast send failed: {e}");
                report.failed.push(id);
            }
        }
    }

    debug!(
        %sender,
        bytes = message.len(),
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "broadcast complete"
    );
    report
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::Registry;
    use crate::mock::MockPeer;

    fn registry_with(n: u64) -> (Registry<MockPeer>, Vec<MockPeer>) {
        let mut registry = Registry::with_capacity(n as usize + 1);
        let mut handles = Vec::new();
        for raw in 1..=n {
            let peer = MockPeer::new(ConnectionId::new(raw));
            handles.push(peer.clone());
            registry.add(peer).unwrap();
        }
        (registry, handles)
    }

    #[test]
    fn test_broadcast_skips_sender_and_reaches_everyone_else() {
        // Arrange
        let (registry, peers) = registry_with(3);

        // Act
        let report = broadcast(&registry, b"hi", ConnectionId::new(1));

        // Assert
        assert_eq!(report.delivered_count(), registry.size() - 1);
        assert_eq!(peers[0].sent_count(), 0, "sender must not hear itself");
        assert_eq!(peers[1].sent(), vec![b"hi".to_vec()]);
        assert_eq!(peers[2].sent(), vec![b"hi".to_vec()]);
    }

    #[test]
    fn test_broadcast_with_lone_sender_delivers_nothing() {
        let (registry, peers) = registry_with(1);

        let report = broadcast(&registry, b"hello", ConnectionId::new(1));

        assert_eq!(report, BroadcastReport::default());
        assert_eq!(peers[0].sent_count(), 0);
    }

    #[test]
    fn test_broadcast_continues_after_a_failed_recipient() {
        // Arrange: the middle recipient's socket is broken.
        let (registry, peers) = registry_with(4);
        peers[2].fail_sends();

        // Act
        let report = broadcast(&registry, b"msg", ConnectionId::new(1));

        // Assert
        assert_eq!(report.failed, vec![ConnectionId::new(3)]);
        assert_eq!(
            report.delivered,
            vec![ConnectionId::new(2), ConnectionId::new(4)]
        );
        assert!(!report.is_clean());
        // Lazy removal: the failing peer is still registered.
        assert!(registry.contains(ConnectionId::new(3)));
    }

    #[test]
    fn test_broadcast_forwards_bytes_unchanged() {
        let (registry, peers) = registry_with(2);
        let payload = [0u8, 0xff, b'\n', b'x'];

        broadcast(&registry, &payload, ConnectionId::new(2));

        assert_eq!(peers[0].sent(), vec![payload.to_vec()]);
    }

    #[test]
    fn test_broadcast_from_unregistered_sender_reaches_all_members() {
        let (registry, peers) = registry_with(2);

        let report = broadcast(&registry, b"x", ConnectionId::new(42));

        assert_eq!(report.delivered_count(), 2);
        assert!(peers.iter().all(|p| p.sent_count() == 1));
    }

    #[test]
    fn test_broadcast_over_snapshot_ignores_later_joiners() {
        // Arrange
        let (mut registry, _peers) = registry_with(2);
        let snapshot = registry.snapshot();
        let late = MockPeer::new(ConnectionId::new(9));
        registry.add(late.clone()).unwrap();

        // Act
        broadcast(&snapshot, b"x", ConnectionId::new(1));

        // Assert
        assert_eq!(late.sent_count(), 0);
    }
}
