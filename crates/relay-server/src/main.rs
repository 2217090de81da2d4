//! TCP broadcast relay server: entry point.
//!
//! Every chunk of bytes a client sends is written, unchanged, to every other
//! connected client.  There is no framing, no history, and no authentication.
//!
//! # Usage
//!
//! ```text
//! relay-server <PORT> [OPTIONS]
//!
//! Options:
//!   --mode <MODE>            threaded | multiplexed          [default: threaded]
//!   --capacity <N>           maximum simultaneous clients    [default: 10]
//!   --lock-policy <POLICY>   hold | snapshot (threaded only) [default: hold]
//!   --bind <ADDR>            interface to listen on          [default: 0.0.0.0]
//!   --poll-timeout-ms <MS>   readiness wait bound (multiplexed only) [default: 200]
//! ```
//!
//! # Shutdown
//!
//! Ctrl-C stops either mode.  The multiplexed mode also stops on its own once
//! the last client leaves.  Both exit with status 0.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_core::DEFAULT_CAPACITY;
use relay_server::{bind_dispatcher, DispatchMode, LockPolicy, ServerConfig, StopReason};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP broadcast relay server.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Relays every message a client sends to every other connected client",
    version
)]
struct Cli {
    /// TCP port to listen on.
    port: u16,

    /// Dispatch strategy: one thread per client, or one thread for everyone.
    #[arg(long, default_value_t = DispatchMode::Threaded)]
    mode: DispatchMode,

    /// Maximum number of simultaneously connected clients.
    ///
    /// Connections beyond this are accepted and immediately closed.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Whether the registry lock is held for the whole broadcast (`hold`) or
    /// only while copying the membership (`snapshot`).  Threaded mode only.
    #[arg(long, default_value_t = LockPolicy::HoldDuringFanOut)]
    lock_policy: LockPolicy,

    /// IP address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Upper bound on one readiness wait, in milliseconds.  `0` waits
    /// indefinitely.  Multiplexed mode only.
    #[arg(long, default_value_t = 200)]
    poll_timeout_ms: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address or `--capacity` is 0.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        anyhow::ensure!(self.capacity > 0, "--capacity must be at least 1");

        let poll_timeout =
            (self.poll_timeout_ms > 0).then(|| Duration::from_millis(self.poll_timeout_ms));

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            mode: self.mode,
            capacity: self.capacity,
            lock_policy: self.lock_policy,
            poll_timeout,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "relay server starting: mode={}, capacity={}, bind={}",
        config.mode, config.capacity, config.bind_addr
    );

    let dispatcher = bind_dispatcher(&config)
        .with_context(|| format!("could not start server on {}", config.bind_addr))?;
    let handle = dispatcher.handle();

    // The dispatcher blocks in socket calls, so it gets a blocking thread.
    let mut serving = tokio::task::spawn_blocking(move || dispatcher.run());

    let outcome = tokio::select! {
        joined = &mut serving => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("received Ctrl+C, shutting down"),
                Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
            }
            handle.trigger();
            serving.await
        }
    };

    let stop = outcome
        .context("dispatcher thread panicked")?
        .context("server stopped with an error")?;

    match stop {
        StopReason::ShutdownRequested => info!("relay server stopped"),
        StopReason::Drained => info!("last client left, relay server stopped"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
