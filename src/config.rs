//! Tunables for a client connection, following the teacher's
//! `ClientConfig`/`WebSocketConfig` split (the server-side `ServerConfig` has
//! no counterpart here — server acceptance is out of scope).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: usize,
    /// Opt-in: decompress/compress payloads under a negotiated
    /// `permessage-deflate` extension. The engine parses the extension
    /// parameters either way; it only applies them when this is set.
    pub enable_permessage_deflate: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
            enable_permessage_deflate: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub websocket_config: WebSocketConfig,
    /// Path to a PEM file of extra trusted root certificates, appended to
    /// the `webpki-roots` bundle. `None` uses the bundled roots only.
    pub ca_file: Option<String>,
    /// Requested subprotocols, sent as `Sec-WebSocket-Protocol`.
    pub protocols: Vec<String>,
    pub user_agent: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    /// Explicit proxy URL; overrides `HTTP_PROXY`/`HTTPS_PROXY` discovery.
    pub proxy: Option<String>,

    /// How often the session loop wakes up to emit `Event::Poll` even if
    /// the peer is silent.
    pub poll_interval: Duration,
    /// Interval between automatic pings. `None` disables the keepalive ping.
    pub ping_rate: Option<Duration>,
    /// How long to wait for a pong before emitting `Event::Unresponsive`.
    pub ping_timeout: Duration,
    /// Whether to automatically reply to an incoming `Ping` with a `Pong`.
    pub auto_pong: bool,
    /// How long to wait for the peer's echoing CLOSE before giving up and
    /// tearing down the transport unilaterally.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            websocket_config: WebSocketConfig::default(),
            ca_file: None,
            protocols: Vec::new(),
            user_agent: None,
            extra_headers: Vec::new(),
            proxy: None,
            poll_interval: Duration::from_secs(5),
            ping_rate: Some(Duration::from_secs(30)),
            ping_timeout: Duration::from_secs(10),
            auto_pong: true,
            close_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_limits() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_message_size, 64 << 20);
        assert_eq!(config.max_frame_size, 16 << 20);
        assert!(!config.enable_permessage_deflate);
    }

    #[test]
    fn client_config_auto_pong_default_on() {
        let config = ClientConfig::default();
        assert!(config.auto_pong);
        assert!(config.ping_rate.is_some());
    }
}
