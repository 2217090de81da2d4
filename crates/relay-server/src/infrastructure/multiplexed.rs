//! Single-threaded readiness-multiplexed dispatcher.
//!
//! One thread owns the listener, every connection, and the registry.  It
//! blocks in [`mio::Poll::poll`] until any of them is readable, then services
//! each ready source in ascending token order:
//!
//! ```text
//!   ┌──────────── poll(listener, waker, conn-2, conn-3, …) ◄──────────┐
//!   │                          │ ready tokens, sorted                  │
//!   │        ┌─────────────────┼──────────────────────┐                │
//!   │        ▼                 ▼                      ▼                │
//!   │   LISTENER_TOKEN    WAKER_TOKEN            conn token            │
//!   │   accept until      shutdown?              read until WouldBlock │
//!   │   WouldBlock,                              broadcast each chunk  │
//!   │   admit/reject                             retire on EOF/quit    │
//!   │        └─────────────────┴──────────────────────┘                │
//!   │                          │                                       │
//!   │          registry drained after serving? ──yes──► return Drained │
//!   └──────────────────────────┴── no ─────────────────────────────────┘
//! ```
//!
//! mio readiness is edge-triggered, so every readable source is drained until
//! `WouldBlock` before moving on.  If the listener fails part way (e.g. out of
//! file descriptors) the backlog is retried on later turns of the loop,
//! without waiting for a fresh listener event.  A connection that keeps its send buffer
//! full can therefore hold the loop for as long as it keeps writing; that is
//! the price of the single-threaded model.
//!
//! Sends go straight out on the non-blocking socket.  A recipient whose
//! socket buffer is full reports `WouldBlock`, which the broadcast engine
//! counts as a failed delivery; the recipient stays registered until its own
//! next receive fails.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use relay_core::{broadcast, ConnectionId, ConnectionIdAllocator, Peer, Registry, RECV_BUFFER_SIZE};
use tracing::{debug, error, info, trace, warn};

use super::{Dispatcher, ServerError, ServerHandle};
use crate::application::lifecycle::{admit, classify, retire, EndReason, Receive, StopReason};
use crate::domain::ServerConfig;

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
/// Connection ids double as poll tokens, so they start above the reserved ones.
const FIRST_CONNECTION_ID: u64 = 2;

const EVENT_CAPACITY: usize = 128;
/// Upper bound on the readiness wait while the listener still has a backlog.
const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A registered non-blocking TCP connection.
#[derive(Debug)]
pub struct MioPeer {
    id: ConnectionId,
    stream: TcpStream,
}

impl MioPeer {
    fn token(&self) -> Token {
        token_for(self.id)
    }

    /// Shuts down both directions, logging failures at `debug`.
    fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(id = %self.id, "shutdown: {e}");
        }
    }
}

impl Peer for MioPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.stream).write_all(bytes)
    }
}

fn token_for(id: ConnectionId) -> Token {
    Token(id.get() as usize)
}

fn id_for(token: Token) -> ConnectionId {
    ConnectionId::new(token.0 as u64)
}

/// Puts one batch of ready tokens in ascending order, without repeats.
fn order_tokens(tokens: &mut Vec<Token>) {
    tokens.sort_unstable();
    tokens.dedup();
}

/// What the accept loop does after `accept` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The backlog is empty.
    Drained,
    /// Interrupted by a signal; try again at once.
    Retry,
    /// Only this connection was lost; move on to the next one.
    Skip,
    /// The listener itself is failing; try again on a later loop turn.
    Defer,
}

fn on_accept_error(kind: io::ErrorKind) -> AcceptFailure {
    match kind {
        io::ErrorKind::WouldBlock => AcceptFailure::Drained,
        io::ErrorKind::Interrupted => AcceptFailure::Retry,
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset => AcceptFailure::Skip,
        _ => AcceptFailure::Defer,
    }
}

/// Bound on one readiness wait.  A deferred backlog caps it so the retry
/// happens even if no other source becomes ready.
fn wait_bound(poll_timeout: Option<Duration>, accept_pending: bool) -> Option<Duration> {
    if !accept_pending {
        return poll_timeout;
    }
    Some(poll_timeout.map_or(ACCEPT_RETRY_INTERVAL, |t| t.min(ACCEPT_RETRY_INTERVAL)))
}

/// The readiness-multiplexed dispatcher.
pub struct MultiplexedServer {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Registry<MioPeer>,
    ids: ConnectionIdAllocator,
    handle: ServerHandle,
    poll_timeout: Option<Duration>,
    /// Set once the first connection has been admitted.  An empty registry
    /// only ends the loop after this point.
    has_served: bool,
    /// Set when `accept` failed before the backlog was drained.
    accept_pending: bool,
}

impl MultiplexedServer {
    /// Binds the listener and registers it, plus the shutdown waker, with a
    /// fresh poller.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address cannot be bound, or
    /// [`ServerError::Poll`] if the poller cannot be set up.
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::ListenerSetup)?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Poll)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::Poll)?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            registry: Registry::with_capacity(config.capacity),
            ids: ConnectionIdAllocator::starting_at(FIRST_CONNECTION_ID),
            handle: ServerHandle::new(Some(Arc::new(waker))),
            poll_timeout: config.poll_timeout,
            has_served: false,
            accept_pending: false,
        })
    }

    /// Accepts every pending connection.
    fn accept_all(&mut self) {
        loop {
            let (stream, addr) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) => match on_accept_error(e.kind()) {
                    AcceptFailure::Drained => {
                        self.accept_pending = false;
                        return;
                    }
                    AcceptFailure::Retry => continue,
                    AcceptFailure::Skip => {
                        debug!("connection lost before accept: {e}");
                        continue;
                    }
                    AcceptFailure::Defer => {
                        error!("accept error, will retry: {e}");
                        self.accept_pending = true;
                        return;
                    }
                },
            };

            let id = self.ids.next();
            info!(%id, %addr, "incoming connection");

            if let Err(rejected) = admit(&mut self.registry, MioPeer { id, stream }) {
                rejected.into_connection().close();
                continue;
            }

            let registered = match self.registry.get_mut(id) {
                Some(peer) => {
                    let token = peer.token();
                    self.poll
                        .registry()
                        .register(&mut peer.stream, token, Interest::READABLE)
                }
                None => continue,
            };

            if let Err(e) = registered {
                warn!(%id, "could not watch connection: {e}");
                if let Some(peer) = retire(&mut self.registry, id, EndReason::Failed(e.kind())) {
                    peer.close();
                }
                continue;
            }

            self.has_served = true;
            self.handle.set_live(self.registry.size());
        }
    }

    /// Reads everything currently available on `id` and broadcasts each chunk.
    fn service(&mut self, id: ConnectionId) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        let reason = loop {
            let result = match self.registry.get_mut(id) {
                Some(peer) => peer.stream.read(&mut buf),
                // Spurious event for a connection retired earlier in this batch.
                None => return,
            };
            match classify(result, &buf) {
                Receive::Message(n) => {
                    broadcast(&self.registry, &buf[..n], id);
                }
                Receive::Retry => continue,
                Receive::Pending => return,
                Receive::Ended(reason) => break reason,
            }
        };

        self.close(id, reason);
    }

    /// Retires `id`, stops watching it, and closes the socket.
    fn close(&mut self, id: ConnectionId, reason: EndReason) {
        let Some(mut peer) = retire(&mut self.registry, id, reason) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(&mut peer.stream) {
            debug!(%id, "deregister: {e}");
        }
        peer.close();
        self.handle.set_live(self.registry.size());
    }

    /// Closes every remaining connection.
    fn tear_down(&mut self) {
        let remaining = self.registry.drain();
        info!(remaining = remaining.len(), "closing remaining connections");
        for mut peer in remaining {
            if let Err(e) = self.poll.registry().deregister(&mut peer.stream) {
                debug!(id = %peer.id, "deregister: {e}");
            }
            peer.close();
        }
        self.handle.set_live(0);
    }
}

impl Dispatcher for MultiplexedServer {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the readiness loop until shutdown, or until the last connection
    /// leaves after at least one has been served.
    fn run(self: Box<Self>) -> Result<StopReason, ServerError> {
        let mut this = *self;
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut ready: Vec<Token> = Vec::with_capacity(EVENT_CAPACITY);
        info!(
            addr = %this.local_addr,
            mode = "multiplexed",
            "server started, waiting for connections"
        );

        let stop = loop {
            if !this.handle.is_running() {
                break StopReason::ShutdownRequested;
            }

            let timeout = wait_bound(this.poll_timeout, this.accept_pending);
            match this.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    this.tear_down();
                    return Err(ServerError::Poll(e));
                }
            }

            ready.clear();
            ready.extend(events.iter().map(|event| event.token()));
            order_tokens(&mut ready);
            trace!(ready = ready.len(), "poll returned");

            for &token in &ready {
                match token {
                    LISTENER_TOKEN => this.accept_all(),
                    WAKER_TOKEN => {}
                    token => this.service(id_for(token)),
                }
            }
            if this.accept_pending && ready.binary_search(&LISTENER_TOKEN).is_err() {
                this.accept_all();
            }

            if this.has_served && this.registry.is_empty() {
                info!("last client left, stopping");
                break StopReason::Drained;
            }
        };

        this.tear_down();
        Ok(stop)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
