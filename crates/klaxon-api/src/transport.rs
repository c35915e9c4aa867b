// Shared transport configuration for building reqwest::Client instances.
//
// The REST client and the event-stream client share TLS, timeout, and
// auth-header settings through this module. The two builders differ in one
// point: the streaming client carries no total request timeout, because an
// event-stream response body is expected to never complete.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const USER_AGENT: &str = "klaxon/0.1.0";

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Accept any certificate (for self-hosted consoles with self-signed
    /// certificates).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Total per-request timeout for request/response calls.
    pub timeout: Duration,
    /// Connection-establishment timeout, applied to both clients.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` for request/response calls.
    pub fn build_client(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        self.builder(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build a `reqwest::Client` for the long-lived event stream.
    ///
    /// Omits the total request timeout: the stream body stays open for the
    /// lifetime of the subscription, so only the connect timeout applies.
    pub fn build_streaming_client(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        self.builder(headers)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build streaming client: {e}")))
    }

    fn builder(&self, headers: HeaderMap) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(self.connect_timeout)
            .default_headers(headers);

        if matches!(self.tls, TlsMode::DangerAcceptInvalid) {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
    }
}

/// Build the default-header map carrying the admin bearer token.
///
/// The header value is marked sensitive so it never shows up in logs.
pub fn bearer_headers(token: &SecretString) -> Result<HeaderMap, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| Error::Config(format!("invalid admin token: {e}")))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, value);
    Ok(headers)
}
