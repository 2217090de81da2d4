//! Domain layer: server configuration.

pub mod config;

pub use config::{DispatchMode, LockPolicy, ServerConfig};
