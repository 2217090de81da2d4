//! Infrastructure layer: sockets, threads, and the readiness loop.
//!
//! # Sub-modules
//!
//! - **`threaded`** – Accept loop plus one blocking worker thread per
//!   connection.  The registry sits behind a single `Mutex`.
//!
//! - **`multiplexed`** – A single thread waiting on a `mio::Poll` over the
//!   listener and every connection.  The registry is owned, not shared.
//!
//! Both implement [`Dispatcher`], so the binary and the tests can swap one for
//! the other without changing anything else.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use crate::application::lifecycle::StopReason;
use crate::domain::{DispatchMode, ServerConfig};

pub mod multiplexed;
pub mod threaded;

pub use multiplexed::MultiplexedServer;
pub use threaded::ThreadedServer;

/// Setup failures.  Anything after setup is handled per connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created, bound, or put in listen state.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The listener was bound but could not be configured.
    #[error("listener setup failed: {0}")]
    ListenerSetup(#[source] std::io::Error),
    /// The readiness poller could not be created or waited on.
    #[error("readiness poll failed: {0}")]
    Poll(#[source] std::io::Error),
    /// The dispatcher thread could not be spawned.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Cloneable control and observation handle for a running dispatcher.
///
/// `trigger` asks the dispatcher to stop.  The threaded dispatcher notices
/// within one accept poll interval; the multiplexed dispatcher is woken
/// immediately through its `mio::Waker`.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    waker: Option<Arc<mio::Waker>>,
}

impl ServerHandle {
    pub(crate) fn new(waker: Option<Arc<mio::Waker>>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            live: Arc::new(AtomicUsize::new(0)),
            waker,
        }
    }

    /// Requests shutdown.  Idempotent.
    pub fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                warn!("failed to wake dispatcher for shutdown: {e}");
            }
        }
    }

    /// `false` once shutdown has been requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of connections currently registered.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn set_live(&self, n: usize) {
        self.live.store(n, Ordering::SeqCst);
    }
}

/// A dispatch strategy bound to a listening socket, ready to serve.
pub trait Dispatcher: Send {
    /// Address the listener is actually bound to (resolves port 0).
    fn local_addr(&self) -> SocketAddr;

    /// Handle for stopping and observing this dispatcher.
    fn handle(&self) -> ServerHandle;

    /// Serves connections on the calling thread until the dispatcher stops.
    ///
    /// # Errors
    ///
    /// Only unrecoverable failures of the listener or poller are returned.
    /// Per-connection errors end that connection and nothing else.
    fn run(self: Box<Self>) -> Result<StopReason, ServerError>;
}

/// Binds the listener for the configured dispatch mode.
///
/// # Errors
///
/// Returns [`ServerError::BindFailed`] if the address cannot be bound, or a
/// setup error if the listener or poller cannot be configured.
pub fn bind_dispatcher(config: &ServerConfig) -> Result<Box<dyn Dispatcher>, ServerError> {
    Ok(match config.mode {
        DispatchMode::Threaded => Box::new(ThreadedServer::bind(config)?),
        DispatchMode::Multiplexed => Box::new(MultiplexedServer::bind(config)?),
    })
}

/// A dispatcher running on its own thread.
///
/// Used by the integration tests; the binary runs the dispatcher inside
/// `spawn_blocking` instead.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: ServerHandle,
    done: mpsc::Receiver<Result<StopReason, ServerError>>,
    thread: Option<JoinHandle<()>>,
}

impl RunningServer {
    /// Binds according to `config` and starts serving on a background thread.
    ///
    /// # Errors
    ///
    /// Returns any bind/setup error, or [`ServerError::Spawn`].
    pub fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let dispatcher = bind_dispatcher(config)?;
        let local_addr = dispatcher.local_addr();
        let handle = dispatcher.handle();
        let (tx, done) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name(format!("relay-{}", config.mode))
            .spawn(move || {
                let outcome = dispatcher.run();
                if let Err(e) = &outcome {
                    error!("dispatcher stopped with error: {e}");
                }
                let _ = tx.send(outcome);
            })
            .map_err(ServerError::Spawn)?;

        Ok(Self {
            local_addr,
            handle,
            done,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Waits up to `timeout` for the dispatcher to stop on its own.
    ///
    /// Returns `None` if it is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<StopReason, ServerError>> {
        let outcome = self.done.recv_timeout(timeout).ok()?;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Some(outcome)
    }

    /// Requests shutdown and waits up to `timeout` for the dispatcher to stop.
    pub fn stop(mut self, timeout: Duration) -> Option<Result<StopReason, ServerError>> {
        self.handle.trigger();
        self.wait_timeout(timeout)
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.trigger();
    }
}
