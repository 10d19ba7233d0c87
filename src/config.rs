//! Client configuration

use std::time::Duration;

/// Connection and timer settings for a client session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    pub use_tls: bool,
    /// How long an outgoing call rings before it is abandoned.
    pub ring_timeout_secs: u64,
    /// Idle period after the last keystroke before `typing:stop` is published.
    /// The same window is used to expire inbound typing indicators.
    pub typing_debounce_ms: u64,
}

impl ClientConfig {
    pub fn new(host: &str, port: u16, use_tls: bool) -> Self {
        Self {
            server_host: host.to_string(),
            server_port: port,
            use_tls,
            ring_timeout_secs: 30,
            typing_debounce_ms: 2000,
        }
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.server_host, self.server_port)
    }

    pub fn ws_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}/ws", scheme, self.server_host, self.server_port)
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = ClientConfig::new("chat.example.com", 5000, false);
        assert_eq!(config.http_url(), "http://chat.example.com:5000");
        assert_eq!(config.ws_url(), "ws://chat.example.com:5000/ws");

        let tls = ClientConfig::new("chat.example.com", 443, true);
        assert_eq!(tls.http_url(), "https://chat.example.com:443");
        assert_eq!(tls.ws_url(), "wss://chat.example.com:443/ws");
    }

    #[test]
    fn test_default_timers() {
        let config = ClientConfig::new("localhost", 5000, false);
        assert_eq!(config.ring_timeout(), Duration::from_secs(30));
        assert_eq!(config.typing_debounce(), Duration::from_millis(2000));
    }
}
