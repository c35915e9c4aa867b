use thiserror::Error;

/// Top-level error type for the `klaxon-api` crate.
///
/// Covers every failure mode across both API surfaces: the request/response
/// admin endpoints and the server-pushed event stream. `klaxon-core` maps
/// these into consumer-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid client-side configuration (e.g. a token that cannot be
    /// carried in a header).
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Admin API ───────────────────────────────────────────────────
    /// Admin token missing or rejected (HTTP 401).
    #[error("Unauthorized -- admin token missing or rejected")]
    Unauthorized,

    /// Structured error from the admin API (`{"message": ...}` envelope).
    #[error("Admin API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event stream ────────────────────────────────────────────────
    /// Event stream connection failed or dropped mid-read.
    #[error("Event stream failed: {0}")]
    Stream(String),
}
