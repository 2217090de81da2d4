//! Domain layer: connection identity, the bounded registry, and wire rules.
//!
//! # Sub-modules
//!
//! - **`connection`** – [`ConnectionId`] handles, the id allocator, and the
//!   [`Peer`] trait every transport implements.
//!
//! - **`registry`** – The bounded, insertion-ordered set of live connections.
//!   It is the single source of truth for "who is currently connected".
//!
//! - **`wire`** – Receive buffer capacity and the `quit` sentinel.
//!
//! [`ConnectionId`]: connection::ConnectionId
//! [`Peer`]: connection::Peer

pub mod connection;
pub mod registry;
pub mod wire;
