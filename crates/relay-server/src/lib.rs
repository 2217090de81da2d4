//! relay-server library crate.
//!
//! A TCP broadcast relay: every chunk of bytes one client sends is written
//! verbatim to every other connected client.  The binary in `main.rs` and the
//! integration tests in `tests/` share this module tree.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! clients (raw TCP)
//!         ↕
//! [relay-server]
//!   ├── domain/           ServerConfig, DispatchMode, LockPolicy
//!   ├── application/      lifecycle: admit, classify receive, retire
//!   └── infrastructure/
//!         ├── threaded/    accept loop + one blocking worker per connection
//!         └── multiplexed/ one thread, mio readiness loop
//!         ↓
//! [relay-core]            Registry, broadcast engine, wire rules
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no threads.
//! - `application` depends on `domain` and `relay-core` only.
//! - `infrastructure` owns every socket and thread.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: per-connection lifecycle rules.
pub mod application;

/// Infrastructure layer: the two dispatchers and the control handle.
pub mod infrastructure;

pub use application::lifecycle::StopReason;
pub use domain::{DispatchMode, LockPolicy, ServerConfig};
pub use infrastructure::{bind_dispatcher, Dispatcher, RunningServer, ServerError, ServerHandle};
