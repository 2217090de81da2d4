//! Domain layer: pure client-side types (no I/O).
//!
//! # Sub-modules
//!
//! - **`config`** – [`ClientConfig`], built from the command line.
//! - **`message`** – Turning a typed line into bytes on the wire, and bytes
//!   off the wire into displayable text.

pub mod config;
pub mod message;

pub use config::ClientConfig;
pub use message::{compose_message, decode_incoming, encode_outgoing, parse_input, InputLine};
