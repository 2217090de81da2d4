//! relay-client library crate.
//!
//! An interactive terminal client for the broadcast relay: lines typed by the
//! user go to the server as `"<username>: <line>"`, and whatever the server
//! relays is printed.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! terminal (stdin / stdout)
//!         ↕
//! [relay-client]
//!   ├── domain/           ClientConfig, chat line parsing and formatting
//!   ├── application/      session: input loop + receive loop
//!   └── infrastructure/
//!         ├── network/    resolve + connect (tokio)
//!         ├── terminal/   ANSI renderer, username prompt
//!         └── stdin/      line reader thread
//!         ↕
//! relay-server  (raw bytes over TCP)
//! ```

/// Domain layer: configuration and chat line rules (no I/O).
pub mod domain;

/// Application layer: the two-loop session.
pub mod application;

/// Infrastructure layer: socket, terminal, and stdin.
pub mod infrastructure;

/// Test doubles shared by unit and integration tests.
pub mod mock;

pub use application::session::{run_session, Renderer, SessionEnd};
pub use domain::ClientConfig;
pub use infrastructure::{connect, ClientError};
