//! Thread-per-connection dispatcher.
//!
//! ```text
//! accept thread ──accept──► admit ──► spawn worker "relay-conn-N"
//!                                        │
//!                           ┌────────────┘
//!                           ▼
//!                  loop { read ─► lock ─► broadcast ─► unlock }
//!                           │ EOF / error / quit
//!                           ▼
//!                  lock ─► retire(self) ─► unlock ─► close
//! ```
//!
//! # Locking
//!
//! The registry is the only shared mutable state and sits behind one
//! `std::sync::Mutex`.  Registration, deregistration and broadcast all happen
//! under that lock.  How much of the broadcast runs under it is chosen by
//! [`LockPolicy`]; with the default `HoldDuringFanOut` a recipient whose
//! socket buffer is full blocks the sender's worker inside `write`, while
//! still holding the lock, and every other worker waits behind it.
//!
//! # Shutdown
//!
//! The accept loop polls a non-blocking listener so it can watch the
//! `running` flag.  When the flag clears, it shuts down every worker's socket
//! (waking reads blocked in `recv` and writes blocked in `send`), then joins
//! the workers.  Each worker still deregisters itself on the way out, so the
//! registry is emptied by the same code path as a normal disconnect.
//!
//! The accept thread never waits on the registry lock unconditionally: a
//! worker stuck in a send may be holding it, and only teardown can unstick
//! that worker.  A connection accepted while shutdown is pending is closed
//! without being registered.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relay_core::{
    broadcast, BroadcastReport, ConnectionId, ConnectionIdAllocator, Peer, Registry,
    RECV_BUFFER_SIZE,
};
use tracing::{debug, error, info, warn};

use super::{Dispatcher, ServerError, ServerHandle};
use crate::application::lifecycle::{admit, classify, retire, EndReason, Receive, StopReason};
use crate::domain::{LockPolicy, ServerConfig};

/// How often the accept loop re-checks the shutdown flag when idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long the accept thread waits between attempts on a busy registry lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

type SharedRegistry = Arc<Mutex<Registry<StreamPeer>>>;

/// A registered blocking TCP connection.
///
/// Clones share the same socket.  The registry holds one clone and the
/// worker thread reads through another.
#[derive(Debug, Clone)]
pub struct StreamPeer {
    id: ConnectionId,
    stream: Arc<TcpStream>,
}

impl StreamPeer {
    fn new(id: ConnectionId, stream: TcpStream) -> Self {
        Self {
            id,
            stream: Arc::new(stream),
        }
    }

    /// Shuts down both directions.  Failures (e.g. already shut down) are
    /// logged at `debug` and otherwise ignored.
    fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(id = %self.id, "shutdown: {e}");
        }
    }
}

impl Peer for StreamPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        (&*self.stream).write_all(bytes)
    }
}

/// A live worker thread and the socket it serves.
struct Worker {
    peer: StreamPeer,
    thread: JoinHandle<()>,
}

/// The thread-per-connection dispatcher.
pub struct ThreadedServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: SharedRegistry,
    lock_policy: LockPolicy,
    ids: ConnectionIdAllocator,
    handle: ServerHandle,
}

impl ThreadedServer {
    /// Binds and listens on `config.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] or [`ServerError::ListenerSetup`].
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr;
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::ListenerSetup)?;
        let local_addr = listener.local_addr().map_err(ServerError::ListenerSetup)?;

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(Mutex::new(Registry::with_capacity(config.capacity))),
            lock_policy: config.lock_policy,
            ids: ConnectionIdAllocator::default(),
            handle: ServerHandle::new(None),
        })
    }

    /// Accepts one pending connection, if any.  Returns `false` when idle.
    fn accept_one(&self, workers: &mut Vec<Worker>) -> bool {
        let (stream, addr) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return true,
            Err(e) => {
                error!("accept error: {e}");
                return false;
            }
        };

        let peer = StreamPeer::new(self.ids.next(), stream);
        let id = peer.id();

        // Accepted sockets may inherit the listener's non-blocking flag.
        if let Err(e) = peer.stream.set_nonblocking(false) {
            warn!(%id, %addr, "could not make accepted socket blocking: {e}");
            peer.close();
            return true;
        }
        info!(%id, %addr, "incoming connection");

        let Some(mut registry) = self.lock_unless_stopping() else {
            debug!(%id, "shutdown requested, dropping connection");
            peer.close();
            return false;
        };
        if let Err(rejected) = admit(&mut registry, peer.clone()) {
            drop(registry);
            rejected.into_connection().close();
            return true;
        }
        self.handle.set_live(registry.size());
        drop(registry);

        let registry = Arc::clone(&self.registry);
        let handle = self.handle.clone();
        let policy = self.lock_policy;
        let worker_peer = peer.clone();
        let spawned = thread::Builder::new()
            .name(format!("relay-{id}"))
            .spawn(move || serve_connection(worker_peer, registry, policy, handle));

        match spawned {
            Ok(thread) => workers.push(Worker { peer, thread }),
            Err(e) => {
                error!(%id, "failed to spawn worker: {e}");
                if let Some(mut registry) = self.lock_unless_stopping() {
                    retire(&mut registry, id, EndReason::Failed(e.kind()));
                    self.handle.set_live(registry.size());
                }
                peer.close();
            }
        }
        true
    }

    /// Locks the registry from the accept thread, giving up once shutdown
    /// has been requested.
    ///
    /// Under `HoldDuringFanOut` a worker can hold the lock while blocked in a
    /// send to a recipient that is not reading.  Only teardown unblocks it,
    /// and teardown runs on the accept thread.
    fn lock_unless_stopping(&self) -> Option<MutexGuard<'_, Registry<StreamPeer>>> {
        loop {
            match self.registry.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) if !self.handle.is_running() => return None,
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY_INTERVAL),
            }
        }
    }

    /// Interrupts every worker and waits for all of them to exit.
    fn tear_down(&self, workers: Vec<Worker>) {
        info!(workers = workers.len(), "stopping workers");
        for worker in &workers {
            worker.peer.close();
        }
        for worker in workers {
            if worker.thread.join().is_err() {
                error!(id = %worker.peer.id(), "worker panicked");
            }
        }
        self.handle.set_live(lock(&self.registry).size());
    }
}

impl Dispatcher for ThreadedServer {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the accept loop.  An empty registry does not stop the server;
    /// only a shutdown request does.
    fn run(self: Box<Self>) -> Result<StopReason, ServerError> {
        info!(
            addr = %self.local_addr,
            mode = "threaded",
            policy = %self.lock_policy,
            "server started, waiting for connections"
        );
        let mut workers: Vec<Worker> = Vec::new();

        while self.handle.is_running() {
            if !self.accept_one(&mut workers) {
                workers.retain(|w| !w.thread.is_finished());
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }

        self.tear_down(workers);
        Ok(StopReason::ShutdownRequested)
    }
}

/// Body of one worker thread.
fn serve_connection(
    peer: StreamPeer,
    registry: SharedRegistry,
    policy: LockPolicy,
    handle: ServerHandle,
) {
    let id = peer.id();
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    let reason = loop {
        let result = (&*peer.stream).read(&mut buf);
        match classify(result, &buf) {
            Receive::Message(n) => {
                fan_out(&registry, policy, &buf[..n], id);
            }
            Receive::Pending | Receive::Retry => continue,
            Receive::Ended(reason) => break reason,
        }
    };

    let mut guard = lock(&registry);
    let removed = retire(&mut guard, id, reason);
    handle.set_live(guard.size());
    drop(guard);

    if let Some(peer) = removed {
        peer.close();
    }
}

/// Broadcasts one message under the configured lock policy.
fn fan_out(
    registry: &SharedRegistry,
    policy: LockPolicy,
    message: &[u8],
    sender: ConnectionId,
) -> BroadcastReport {
    match policy {
        LockPolicy::HoldDuringFanOut => {
            let guard = lock(registry);
            broadcast(&*guard, message, sender)
        }
        LockPolicy::SnapshotThenSend => {
            let recipients = lock(registry).snapshot();
            broadcast(&recipients, message, sender)
        }
    }
}

/// Locks the registry, recovering it if another worker panicked mid-update.
///
/// Every registry method leaves the membership consistent before it can
/// panic, so the data behind a poisoned lock is still valid.
fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry<StreamPeer>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
