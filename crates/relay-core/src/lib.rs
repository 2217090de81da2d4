//! # relay-core
//!
//! Shared building blocks for the TCP broadcast relay: the bounded connection
//! registry, the broadcast engine, and the handful of wire rules (receive
//! buffer size, `quit` sentinel) that the server and the client must agree on.
//!
//! This crate performs no socket I/O of its own.  Every transport is reached
//! through the [`Peer`] trait, so the same registry and fan-out code is driven
//! by blocking `std::net` streams in the threaded server, by `mio` streams in
//! the multiplexed server, and by in-memory mocks in tests.
//!
//! # Architecture overview
//!
//! - **`domain`** – Connection identity, the [`Registry`], and wire constants.
//!   Pure data structures with no threads and no I/O.
//!
//! - **`application`** – The broadcast engine: "send these bytes to every
//!   member except the sender, and tell me who got them".
//!
//! - **`mock`** – A recording [`Peer`] used by unit and integration tests
//!   across the workspace.

pub mod application;
pub mod domain;
pub mod mock;

pub use application::broadcast::{broadcast, BroadcastReport};
pub use domain::connection::{ConnectionId, ConnectionIdAllocator, Peer};
pub use domain::registry::{RejectReason, Rejected, Registry, DEFAULT_CAPACITY};
pub use domain::wire::{is_quit, strip_terminator, QUIT_SENTINEL, RECV_BUFFER_SIZE};
