//! Application layer for the relay core.
//!
//! - **`broadcast`** – The fan-out engine.  Given a message and the id of the
//!   connection it came from, it sends the message to every other recipient
//!   and reports who received it.

pub mod broadcast;
