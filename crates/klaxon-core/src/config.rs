// ── Session configuration ──

use secrecy::SecretString;
use url::Url;

use klaxon_api::{ReconnectConfig, TransportConfig};

/// Configuration for a console [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Base URL of the platform backend, e.g. `https://backend.example.org`.
    pub base_url: Url,

    /// Admin bearer token, when the deployment requires one.
    pub api_token: Option<SecretString>,

    /// HTTP transport tuning (TLS mode, timeouts).
    pub transport: TransportConfig,

    /// Event-stream reconnection tuning.
    pub reconnect: ReconnectConfig,

    /// Subscribe to the live event stream after the snapshot load.
    /// Disable for one-shot inspection sessions that only need the
    /// initial state.
    pub stream_enabled: bool,
}

impl ConsoleConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_token: None,
            transport: TransportConfig::default(),
            reconnect: ReconnectConfig::default(),
            stream_enabled: true,
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.api_token = Some(token);
        self
    }
}
