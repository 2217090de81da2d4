//! Application layer for the relay server.
//!
//! - **`lifecycle`** – The rules every connection follows from accept to
//!   close: admission into the registry, classification of each receive, and
//!   single-shot retirement.  Shared by both dispatch strategies.
//!
//! The broadcast engine itself lives in `relay_core::application::broadcast`.

pub mod lifecycle;
