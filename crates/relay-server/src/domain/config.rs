//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! a plain struct with no global state and no environment reads, so tests can
//! build one directly and the binary can build one from CLI arguments.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use relay_core::DEFAULT_CAPACITY;

/// Which dispatch strategy serves the connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One OS thread per connection; registry behind a mutex.
    #[default]
    Threaded,
    /// One thread total, driven by a readiness wait over every socket.
    Multiplexed,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchMode::Threaded => "threaded",
            DispatchMode::Multiplexed => "multiplexed",
        })
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threaded" => Ok(DispatchMode::Threaded),
            "multiplexed" | "mux" => Ok(DispatchMode::Multiplexed),
            other => Err(format!(
                "unknown dispatch mode '{other}' (expected 'threaded' or 'multiplexed')"
            )),
        }
    }
}

/// How long the threaded dispatcher holds the registry lock while broadcasting.
///
/// | Policy             | Lock held during       | Trade-off                                    |
/// |--------------------|------------------------|----------------------------------------------|
/// | `HoldDuringFanOut` | snapshot **and** sends | one slow recipient stalls every broadcaster  |
/// | `SnapshotThenSend` | snapshot only          | joiners/leavers mid-broadcast may be missed  |
///
/// With `HoldDuringFanOut` concurrent broadcasts are serialised, so every
/// recipient sees them in the same order.  With `SnapshotThenSend` two
/// broadcasts can interleave and recipients may disagree on order.
///
/// The multiplexed dispatcher ignores this setting: it has one thread and no lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    #[default]
    HoldDuringFanOut,
    SnapshotThenSend,
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockPolicy::HoldDuringFanOut => "hold",
            LockPolicy::SnapshotThenSend => "snapshot",
        })
    }
}

impl FromStr for LockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Ok(LockPolicy::HoldDuringFanOut),
            "snapshot" => Ok(LockPolicy::SnapshotThenSend),
            other => Err(format!(
                "unknown lock policy '{other}' (expected 'hold' or 'snapshot')"
            )),
        }
    }
}

/// All runtime configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub bind_addr: SocketAddr,
    /// Dispatch strategy.
    pub mode: DispatchMode,
    /// Maximum number of simultaneously registered connections.
    pub capacity: usize,
    /// Registry locking during fan-out (threaded mode only).
    pub lock_policy: LockPolicy,
    /// Upper bound on one readiness wait (multiplexed mode only).
    ///
    /// `None` waits indefinitely; shutdown still wakes the loop.
    pub poll_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Default configuration listening on every interface at `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    /// | Field         | Default        |
    /// |---------------|----------------|
    /// | bind_addr     | `0.0.0.0:0`    |
    /// | mode          | threaded       |
    /// | capacity      | 10             |
    /// | lock_policy   | hold           |
    /// | poll_timeout  | 200 ms         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            mode: DispatchMode::default(),
            capacity: DEFAULT_CAPACITY,
            lock_policy: LockPolicy::default(),
            poll_timeout: Some(Duration::from_millis(200)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
