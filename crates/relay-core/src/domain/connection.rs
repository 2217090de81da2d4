//! Connection identity and the transport seam.
//!
//! # Why not use the socket itself as the handle?
//!
//! Raw descriptors get reused by the OS: once a socket is closed, the next
//! `accept` may hand out the same number.  A registry keyed on descriptors can
//! therefore confuse a new connection with a stale entry.  Each accepted
//! connection instead receives a [`ConnectionId`] from a process-wide
//! [`ConnectionIdAllocator`], which never repeats an id.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of one accepted connection.
///
/// Ids are only compared for equality and ordered for deterministic iteration;
/// they carry no other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id.  Intended for allocators and tests.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Thread-safe, monotonically increasing source of [`ConnectionId`]s.
///
/// Uses an `AtomicU64` so the accept loop and tests can hand out ids without a
/// lock.  The first id is `start`.
///
/// # Examples
///
/// ```rust
/// use relay_core::ConnectionIdAllocator;
///
/// let ids = ConnectionIdAllocator::starting_at(1);
/// assert_eq!(ids.next().get(), 1);
/// assert_eq!(ids.next().get(), 2);
/// ```
#[derive(Debug)]
pub struct ConnectionIdAllocator {
    inner: AtomicU64,
}

impl ConnectionIdAllocator {
    /// Creates an allocator whose first id is `start`.
    pub const fn starting_at(start: u64) -> Self {
        Self {
            inner: AtomicU64::new(start),
        }
    }

    /// Returns a fresh id.
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.inner.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// A registered connection as seen by the registry and the broadcast engine.
///
/// The relay only ever needs two things from a transport: who it is, and
/// "send these bytes".  Receiving is driven by the dispatch strategy, not by
/// the registry, so it is not part of this trait.
///
/// `send` takes `&self` so a peer can be written to while it sits inside a
/// shared collection.  `std::net::TcpStream` and `mio::net::TcpStream` both
/// implement `Write` for `&Stream`, which makes this cheap to satisfy.
pub trait Peer {
    /// Identity of this connection.
    fn id(&self) -> ConnectionId;

    /// Writes the whole message to the peer.
    ///
    /// # Errors
    ///
    /// Returns the transport error unchanged.  Callers decide whether the
    /// error ends the session.
    fn send(&self, bytes: &[u8]) -> io::Result<()>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_default_starts_at_one() {
        // Arrange
        let ids = ConnectionIdAllocator::default();

        // Act / Assert
        assert_eq!(ids.next(), ConnectionId::new(1));
    }

    #[test]
    fn test_allocator_never_repeats_an_id() {
        let ids = ConnectionIdAllocator::starting_at(10);
        let a = ids.next();
        let b = ids.next();
        let c = ids.next();
        assert!(a < b && b < c, "ids must increase monotonically");
    }

    #[test]
    fn test_allocator_is_usable_from_many_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;

        // Arrange
        let ids = Arc::new(ConnectionIdAllocator::default());

        // Act: four threads each take 100 ids.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..100).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let all: Vec<ConnectionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // Assert
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), 400, "every allocated id must be unique");
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }
}
