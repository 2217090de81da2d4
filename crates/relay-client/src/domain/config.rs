//! Client configuration.

/// Runtime settings for one client session.
///
/// | Field      | Source                 |
/// |------------|------------------------|
/// | `host`     | `<HOST>` argument      |
/// | `port`     | `<PORT>` argument      |
/// | `username` | `--username`, or asked for interactively when `None` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or IP address of the relay server.
    pub host: String,
    /// TCP port of the relay server.
    pub port: u16,
    /// Name prefixed to every outgoing chat line.
    pub username: Option<String>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
        }
    }

    /// `host:port`, for log lines and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_joins_host_and_port() {
        let config = ClientConfig::new("relay.local", 7000);
        assert_eq!(config.target(), "relay.local:7000");
        assert_eq!(config.username, None);
    }
}
