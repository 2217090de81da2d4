//! Recording peer for tests.
//!
//! `MockPeer` replaces a socket with an in-memory log of every message sent
//! to it.  Clones share the same log, so a test can keep one clone, hand the
//! other to a [`Registry`](crate::Registry), and inspect deliveries afterwards.
//!
//! # `fail_sends`
//!
//! Call [`MockPeer::fail_sends`] to make every later `send` return
//! `BrokenPipe`.  This exercises the broadcast engine's partial-failure path
//! without a real half-closed socket.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::connection::{ConnectionId, Peer};

/// A peer that records sent messages instead of writing to a socket.
#[derive(Debug, Clone)]
pub struct MockPeer {
    id: ConnectionId,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl MockPeer {
    /// Creates a peer with an empty log that accepts every send.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent `send` fail with `BrokenPipe`.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Returns a copy of every message delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of messages delivered so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Peer for MockPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock send failure"));
        }
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}
