//! Application layer for the relay client.
//!
//! - **`session`** – The input loop and the receive loop that share one
//!   connection, and the rule for which of them decides how the session
//!   ended.  Generic over the byte streams and the [`Renderer`], so tests
//!   drive it through in-memory pipes.
//!
//! [`Renderer`]: session::Renderer

pub mod session;
