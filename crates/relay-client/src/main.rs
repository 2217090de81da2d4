//! Relay client: entry point.
//!
//! # Usage
//!
//! ```text
//! relay-client <HOST> <PORT> [--username <NAME>]
//! ```
//!
//! Without `--username` the client asks for one after connecting.  Type
//! `quit` to leave.  Set `RUST_LOG=debug` for connection diagnostics; logs
//! are written to stderr.

use std::io;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay_client::infrastructure::{prompt_username, spawn_line_reader, TerminalRenderer};
use relay_client::{connect, run_session, ClientConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Terminal client for the TCP broadcast relay.
#[derive(Debug, Parser)]
#[command(
    name = "relay-client",
    about = "Chat through a relay server: send lines, see everyone else's",
    version
)]
struct Cli {
    /// Host name or IP address of the relay server.
    host: String,

    /// TCP port of the relay server.
    port: u16,

    /// Name shown before each of your messages.  Prompted for when omitted.
    #[arg(long)]
    username: Option<String>,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--username` is blank or spans several lines.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let username = match self.username {
            Some(name) => {
                let name = name.trim().to_owned();
                anyhow::ensure!(!name.is_empty(), "--username must not be blank");
                anyhow::ensure!(!name.contains('\n'), "--username must be a single line");
                Some(name)
            }
            None => None,
        };

        Ok(ClientConfig {
            host: self.host,
            port: self.port,
            username,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;

    let stream = connect(&config)
        .await
        .with_context(|| format!("could not reach relay server at {}", config.target()))?;

    let username = match config.username {
        Some(name) => name,
        None => tokio::task::spawn_blocking(|| {
            prompt_username(&mut io::stdin().lock(), &mut io::stdout())
        })
        .await
        .context("username prompt panicked")?
        .context("could not read username")?,
    };

    // `StdinLock` is not `Send`; the reader thread goes through the shared
    // `Stdin` handle, which keeps anything left buffered by the prompt.
    let input = spawn_line_reader(io::BufReader::new(io::stdin()))
        .context("could not start input reader")?;

    let token = CancellationToken::new();
    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_ctrl_c.cancel(),
            Err(e) => warn!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let (reader, writer) = stream.into_split();
    let renderer = Mutex::new(TerminalRenderer::stdout());
    let end = run_session(reader, writer, input, &username, &renderer, token).await;

    info!("session ended: {end}");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
