//! The bounded registry of live connections.
//!
//! The registry owns every live [`Peer`] the server is serving.  Both dispatch
//! strategies mutate it through the same three operations:
//!
//! ```text
//! accept ──► add(peer) ──► Ok            peer is now a broadcast recipient
//!                    └──► Err(Rejected)  caller closes the socket unserved
//!
//! EOF / error / quit ──► remove(id) ──► Some(peer)  caller closes it, once
//!                                  └──► None        already gone, no-op
//! ```
//!
//! # Storage
//!
//! Members live in a `Vec` kept in insertion order.  Removal shifts the tail
//! left, so the vector never has holes and iteration is always "oldest
//! connection first".  With the capacities this relay runs at (tens of
//! connections) a linear scan beats any map.
//!
//! # Thread safety
//!
//! The registry itself has no interior locking.  The threaded server wraps it
//! in `Arc<Mutex<Registry<_>>>`; the multiplexed server owns it outright on
//! its single thread.

use thiserror::Error;
use tracing::debug;

use super::connection::{ConnectionId, Peer};

/// Registry capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 10;

/// Why an `add` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The registry already holds `capacity` members.
    #[error("registry is full ({capacity} connections)")]
    Full { capacity: usize },
    /// A member with the same id is already registered.
    #[error("{0} is already registered")]
    Duplicate(ConnectionId),
}

/// A refused `add`, handing the connection back to the caller.
///
/// The caller still owns the socket and is responsible for closing it.
#[derive(Debug)]
pub struct Rejected<P> {
    pub reason: RejectReason,
    pub connection: P,
}

impl<P> Rejected<P> {
    /// Returns the connection that was not registered.
    pub fn into_connection(self) -> P {
        self.connection
    }
}

/// Bounded, insertion-ordered collection of live connections.
#[derive(Debug)]
pub struct Registry<P> {
    members: Vec<P>,
    capacity: usize,
}

impl<P: Peer> Registry<P> {
    /// Creates an empty registry with room for [`DEFAULT_CAPACITY`] members.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty registry that never holds more than `capacity` members.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers `peer` at the end of the membership.
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::Full`] when the registry is at capacity and
    /// [`RejectReason::Duplicate`] when the id is already present.  In both
    /// cases the registry is unchanged and the peer is handed back.
    pub fn add(&mut self, peer: P) -> Result<(), Rejected<P>> {
        if self.contains(peer.id()) {
            return Err(Rejected {
                reason: RejectReason::Duplicate(peer.id()),
                connection: peer,
            });
        }
        if self.is_full() {
            return Err(Rejected {
                reason: RejectReason::Full {
                    capacity: self.capacity,
                },
                connection: peer,
            });
        }
        debug!(id = %peer.id(), size = self.members.len() + 1, "registered");
        self.members.push(peer);
        Ok(())
    }

    /// Removes the member with `id`, preserving the order of the others.
    ///
    /// Returns `None` if no such member exists; the registry is left intact.
    pub fn remove(&mut self, id: ConnectionId) -> Option<P> {
        let index = self.members.iter().position(|p| p.id() == id);
        match index {
            Some(index) => {
                let peer = self.members.remove(index);
                debug!(%id, size = self.members.len(), "deregistered");
                Some(peer)
            }
            None => {
                debug!(%id, "remove of unknown connection ignored");
                None
            }
        }
    }

    /// Returns `true` if a member with `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|p| p.id() == id)
    }

    /// Returns a mutable reference to the member with `id`.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut P> {
        self.members.iter_mut().find(|p| p.id() == id)
    }

    /// Current membership count.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Maximum membership count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    /// Ids of all members in iteration order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(Peer::id).collect()
    }

    /// Iterates over members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.members.iter()
    }

    /// Removes and returns every member, leaving the registry empty.
    ///
    /// Used on server shutdown to close all remaining sockets.
    pub fn drain(&mut self) -> Vec<P> {
        std::mem::take(&mut self.members)
    }
}

impl<P: Peer + Clone> Registry<P> {
    /// Returns a copy of the current membership.
    ///
    /// The copy is consistent as of the call; later mutations do not affect it.
    pub fn snapshot(&self) -> Vec<P> {
        self.members.clone()
    }
}

impl<P: Peer> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P: Peer> IntoIterator for &'a Registry<P> {
    type Item = &'a P;
    type IntoIter = std::slice::Iter<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPeer;

    fn peer(raw: u64) -> MockPeer {
        MockPeer::new(ConnectionId::new(raw))
    }

    #[test]
    fn test_registry_starts_empty_with_default_capacity() {
        let registry: Registry<MockPeer> = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_add_registers_peer() {
        // Arrange
        let mut registry = Registry::with_capacity(2);

        // Act
        registry.add(peer(1)).unwrap();

        // Assert
        assert!(registry.contains(ConnectionId::new(1)));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_add_beyond_capacity_is_rejected_and_returns_peer() {
        // Arrange
        let mut registry = Registry::with_capacity(2);
        registry.add(peer(1)).unwrap();
        registry.add(peer(2)).unwrap();

        // Act
        let rejected = registry.add(peer(3)).unwrap_err();

        // Assert
        assert_eq!(rejected.reason, RejectReason::Full { capacity: 2 });
        assert_eq!(rejected.into_connection().id(), ConnectionId::new(3));
        assert_eq!(registry.size(), 2);
        assert!(!registry.contains(ConnectionId::new(3)));
    }

    #[test]
    fn test_add_duplicate_id_is_rejected() {
        let mut registry = Registry::with_capacity(4);
        registry.add(peer(1)).unwrap();

        let rejected = registry.add(peer(1)).unwrap_err();

        assert_eq!(rejected.reason, RejectReason::Duplicate(ConnectionId::new(1)));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut registry = Registry::with_capacity(0);
        assert!(registry.add(peer(1)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_preserves_insertion_order_of_others() {
        // Arrange
        let mut registry = Registry::with_capacity(4);
        for raw in 1..=4 {
            registry.add(peer(raw)).unwrap();
        }

        // Act
        let removed = registry.remove(ConnectionId::new(2));

        // Assert
        assert_eq!(removed.map(|p| p.id()), Some(ConnectionId::new(2)));
        assert_eq!(
            registry.ids(),
            vec![ConnectionId::new(1), ConnectionId::new(3), ConnectionId::new(4)]
        );
    }

    #[test]
    fn test_remove_absent_id_is_a_noop() {
        // Arrange
        let mut registry = Registry::with_capacity(3);
        registry.add(peer(1)).unwrap();
        registry.add(peer(2)).unwrap();

        // Act: remove twice, the second time the id is already gone.
        assert!(registry.remove(ConnectionId::new(1)).is_some());
        assert!(registry.remove(ConnectionId::new(1)).is_none());
        assert!(registry.remove(ConnectionId::new(99)).is_none());

        // Assert: the remaining state is intact and still usable.
        assert_eq!(registry.ids(), vec![ConnectionId::new(2)]);
        registry.add(peer(3)).unwrap();
        assert_eq!(registry.size(), 2);
    }

    #[test]
    fn test_removal_frees_a_slot_for_a_new_peer() {
        let mut registry = Registry::with_capacity(1);
        registry.add(peer(1)).unwrap();
        assert!(registry.is_full());

        registry.remove(ConnectionId::new(1));

        assert!(registry.add(peer(2)).is_ok());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_mutation() {
        // Arrange
        let mut registry = Registry::with_capacity(3);
        registry.add(peer(1)).unwrap();
        registry.add(peer(2)).unwrap();

        // Act
        let snapshot = registry.snapshot();
        registry.remove(ConnectionId::new(1));
        registry.add(peer(3)).unwrap();

        // Assert
        let ids: Vec<_> = snapshot.iter().map(Peer::id).collect();
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2)]);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = Registry::with_capacity(3);
        registry.add(peer(1)).unwrap();
        registry.add(peer(2)).unwrap();

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_mut_finds_member() {
        let mut registry = Registry::with_capacity(2);
        registry.add(peer(5)).unwrap();
        assert!(registry.get_mut(ConnectionId::new(5)).is_some());
        assert!(registry.get_mut(ConnectionId::new(6)).is_none());
    }
}
