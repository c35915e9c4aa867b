// ── Core error types ──
//
// Consumer-facing errors from klaxon-core. These are NOT API-specific --
// consumers never see raw HTTP failures or JSON parse errors directly.
// The `From<klaxon_api::Error>` impl translates wire-layer errors into
// domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the admin API at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Unauthorized -- admin token missing or rejected")]
    Unauthorized,

    /// `connect()` was called on a session that is already connecting or
    /// connected. Use `refresh()` for an explicit reload.
    #[error("Session is already connected")]
    AlreadyConnected,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Admin API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<klaxon_api::Error> for CoreError {
    fn from(err: klaxon_api::Error) -> Self {
        match err {
            klaxon_api::Error::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            klaxon_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            klaxon_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            klaxon_api::Error::Config(msg) => CoreError::Config { message: msg },
            klaxon_api::Error::Unauthorized => CoreError::Unauthorized,
            klaxon_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            klaxon_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            klaxon_api::Error::Stream(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Event stream failed: {reason}"),
            },
        }
    }
}
