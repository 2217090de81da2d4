//! Infrastructure layer: the socket, the terminal, and standard input.
//!
//! # Sub-modules
//!
//! - **`network`** – Resolving the server name and opening the TCP
//!   connection ([`connect`]), plus [`ClientError`].
//! - **`terminal`** – [`TerminalRenderer`] (ANSI output on stdout) and the
//!   username prompt.
//! - **`stdin`** – A dedicated thread that reads lines from standard input
//!   and forwards them to the async session.

pub mod network;
pub mod stdin;
pub mod terminal;

pub use network::{connect, ClientError};
pub use stdin::spawn_line_reader;
pub use terminal::{prompt_username, TerminalRenderer};
