//! TCP connection to the relay server.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info};

use crate::domain::ClientConfig;

/// Errors that prevent a session from starting.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The host name could not be resolved.
    #[error("could not resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    /// The host name resolved to no addresses.
    #[error("'{host}' has no addresses")]
    NoAddress { host: String },
    /// Every resolved address refused or failed the connection.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Local I/O (terminal, stdin) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves `config.host` and connects to the first address that accepts.
///
/// # Errors
///
/// Returns [`ClientError::Resolve`], [`ClientError::NoAddress`], or the
/// [`ClientError::ConnectFailed`] of the last address tried.
pub async fn connect(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let addrs = lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(|source| ClientError::Resolve {
            host: config.host.clone(),
            source,
        })?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("connected to {addr}");
                return Ok(stream);
            }
            Err(source) => {
                debug!("connect to {addr} failed: {source}");
                last_error = Some(ClientError::ConnectFailed { addr, source });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ClientError::NoAddress {
        host: config.host.clone(),
    }))
}
