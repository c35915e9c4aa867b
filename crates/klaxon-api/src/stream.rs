//! Server-pushed event stream with auto-reconnect.
//!
//! Subscribes to the admin `text/event-stream` endpoint and forwards each
//! decoded [`StreamEvent`] through a bounded [`tokio::sync::mpsc`] channel,
//! to be drained by a single consumer in arrival order. Handles
//! reconnection with exponential backoff + jitter and publishes connection
//! health on a [`tokio::sync::watch`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use klaxon_api::stream::{EventStreamHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("https://console.example.org/admin/stream")?;
//!
//! let (handle, mut events) =
//!     EventStreamHandle::connect(http, url, ReconnectConfig::default(), cancel.clone());
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! handle.shutdown();
//! ```

use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::types::{Alert, AlertStatus, DeliveryLog, Device, User};

// ── Event channel capacity ───────────────────────────────────────────
//
// Bounded: a slow consumer exerts backpressure on the stream read loop
// instead of dropping or reordering events.

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── StreamEvent ──────────────────────────────────────────────────────

/// A decoded message from the admin event stream.
///
/// The wire format is one JSON object per stream message, discriminated
/// by a `type` field. Unrecognized types decode as [`Unknown`] and are
/// dropped before reaching consumers (forward compatibility, not an
/// error).
///
/// [`Unknown`]: StreamEvent::Unknown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full-state replacement for alerts, users, and devices: ground
    /// truth at a point in time. A missing collection means empty, not
    /// "leave untouched".
    Snapshot {
        #[serde(default)]
        alerts: Vec<Alert>,
        #[serde(default)]
        users: Vec<User>,
        #[serde(default)]
        devices: Vec<Device>,
    },
    AlertCreated {
        alert: Alert,
    },
    #[serde(rename_all = "camelCase")]
    AlertStatus {
        alert_id: String,
        status: AlertStatus,
        /// Only overwrites the stored value when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_targets: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    AlertAcknowledged {
        alert_id: String,
        acknowledged_count: u32,
    },
    DeliveryLog {
        log: DeliveryLog,
    },
    UserCreated {
        user: User,
    },
    UserDeleted {
        id: String,
    },
    DeviceRegistered {
        device: Device,
    },
    /// Wholesale record replacement, not a field patch.
    DeviceToggled {
        device: Device,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

// ── StreamState ──────────────────────────────────────────────────────

/// Connection health of the event stream, published via `watch`.
///
/// `Backoff` doubles as the degraded-state signal: any deltas pushed
/// while the stream is down are irrecoverably lost, so consumers should
/// resynchronize once the state returns to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// First connection attempt in progress.
    Connecting,
    /// Subscription established, messages flowing.
    Open,
    /// Connection lost; waiting to reconnect.
    Backoff { attempt: u32 },
    /// Loop exited (cancelled, retries exhausted, or consumer dropped).
    Closed,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running event-stream subscription.
///
/// Dropping the handle does not stop the background task; call
/// [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear it down. Dropping the event
/// receiver stops the loop at the next message.
pub struct EventStreamHandle {
    state_rx: watch::Receiver<StreamState>,
    cancel: CancellationToken,
}

impl EventStreamHandle {
    /// Spawn the subscription loop and return the handle plus the event
    /// receiver.
    ///
    /// Returns immediately; the first connection attempt happens on the
    /// background task. There is exactly one receiver -- events are
    /// consumed in arrival order by a single drain loop, never fanned
    /// out.
    pub fn connect(
        http: reqwest::Client,
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(http, url, event_tx, state_tx, reconnect, task_cancel).await;
        });

        (Self { state_rx, cancel }, event_rx)
    }

    /// Subscribe to connection-state changes.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on drop, backoff → reconnect.
async fn stream_loop(
    http: reqwest::Client,
    url: Url,
    event_tx: mpsc::Sender<StreamEvent>,
    state_tx: watch::Sender<StreamState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&http, &url, &event_tx, &state_tx, &cancel) => {
                if event_tx.is_closed() {
                    tracing::debug!("event consumer dropped, stopping stream loop");
                    break;
                }

                match result {
                    // Clean disconnect (server closed the response body).
                    // Reconnect after the initial delay, and still signal
                    // the gap -- deltas pushed during it are gone for good.
                    Ok(()) => {
                        tracing::info!("event stream disconnected cleanly, reconnecting");
                        attempt = 0;
                        let _ = state_tx.send(StreamState::Backoff { attempt });

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(reconnect.initial_delay) => {}
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "event stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "event stream reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        let _ = state_tx.send(StreamState::Backoff { attempt });
                        tracing::info!(
                            delay_ms = delay.as_millis() as u64,
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    let _ = state_tx.send(StreamState::Closed);
    tracing::debug!("event stream loop exiting");
}

// ── Single subscription lifecycle ────────────────────────────────────

/// Establish one stream subscription and read messages until it drops.
async fn connect_and_read(
    http: &reqwest::Client,
    url: &Url,
    event_tx: &mpsc::Sender<StreamEvent>,
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::debug!(url = %url, "connecting to event stream");

    let resp = http
        .get(url.clone())
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| Error::Stream(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Stream(format!("unexpected status {status}")));
    }

    let _ = state_tx.send(StreamState::Open);
    tracing::info!("event stream connected");

    let mut body = resp.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            chunk = body.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        for payload in decoder.feed(&bytes) {
                            let Some(event) = decode_event(&payload) else { continue };
                            if event_tx.send(event).await.is_err() {
                                // Consumer gone -- treated as teardown.
                                return Ok(());
                            }
                        }
                    }
                    Some(Err(e)) => return Err(Error::Stream(e.to_string())),
                    None => {
                        tracing::info!("event stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ── Message decoding ─────────────────────────────────────────────────

/// Decode one stream data payload into a typed event.
///
/// Malformed JSON and unknown event types both yield `None`: the message
/// is logged and dropped, and the stream carries on.
fn decode_event(payload: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(StreamEvent::Unknown) => {
            tracing::debug!("ignoring stream event of unknown type");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed stream payload");
            None
        }
    }
}

// ── SSE framing ──────────────────────────────────────────────────────

/// Incremental `text/event-stream` decoder.
///
/// Byte chunks go in, completed `data` payloads come out. Messages are
/// delimited by a blank line; multiple `data:` lines within one message
/// are joined with a newline. Comment lines (leading ':') and non-data
/// fields (`event:`, `id:`, `retry:`) carry nothing on this stream and
/// are skipped.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: BytesMut,
    data: String,
}

impl SseDecoder {
    /// Feed a chunk of bytes; returns any data payloads completed by it.
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut completed = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            // Strip the trailing '\n' and an optional '\r' before it.
            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            let text = String::from_utf8_lossy(&line[..end]).into_owned();
            if let Some(payload) = self.line(&text) {
                completed.push(payload);
            }
        }
        completed
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            // Message boundary.
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data));
        }
        if line.starts_with(':') {
            // Comment / keep-alive.
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        if field == "data" {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value);
        }
        None
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple
/// consoles watching the same platform.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * ((attempt as f64 * 3.9).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Framing ──────────────────────────────────────────────────────

    #[test]
    fn decoder_yields_payload_at_blank_line() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: {\"type\":\"user_deleted\",\"id\":\"u1\"}\n\n");
        assert_eq!(out, vec!["{\"type\":\"user_deleted\",\"id\":\"u1\"}"]);
    }

    #[test]
    fn decoder_handles_split_chunks() {
        let mut dec = SseDecoder::default();
        assert!(dec.feed(b"data: {\"type\":").is_empty());
        assert!(dec.feed(b"\"user_deleted\",\"id\":\"u1\"}\n").is_empty());
        let out = dec.feed(b"\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], "{\"type\":\"user_deleted\",\"id\":\"u1\"}");
    }

    #[test]
    fn decoder_joins_multi_line_data() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: line one\ndata: line two\n\n");
        assert_eq!(out, vec!["line one\nline two"]);
    }

    #[test]
    fn decoder_skips_comments_and_non_data_fields() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b": keep-alive\nevent: message\nid: 42\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn decoder_handles_crlf_lines() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: x\r\n\r\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn decoder_ignores_empty_messages() {
        let mut dec = SseDecoder::default();
        assert!(dec.feed(b"\n\n\n").is_empty());
    }

    #[test]
    fn decoder_yields_multiple_messages_from_one_chunk() {
        let mut dec = SseDecoder::default();
        let out = dec.feed(b"data: a\n\ndata: b\n\n");
        assert_eq!(out, vec!["a", "b"]);
    }

    // ── Decoding ─────────────────────────────────────────────────────

    #[test]
    fn decode_alert_status_without_total_targets() {
        let payload =
            json!({"type": "alert_status", "alertId": "a1", "status": "delivered"}).to_string();

        match decode_event(&payload) {
            Some(StreamEvent::AlertStatus {
                alert_id,
                status,
                total_targets,
            }) => {
                assert_eq!(alert_id, "a1");
                assert_eq!(status, AlertStatus::Delivered);
                assert!(total_targets.is_none());
            }
            other => panic!("expected AlertStatus, got {other:?}"),
        }
    }

    #[test]
    fn decode_alert_status_with_total_targets() {
        let payload = json!({
            "type": "alert_status",
            "alertId": "a1",
            "status": "sending",
            "totalTargets": 42
        })
        .to_string();

        match decode_event(&payload) {
            Some(StreamEvent::AlertStatus { total_targets, .. }) => {
                assert_eq!(total_targets, Some(42));
            }
            other => panic!("expected AlertStatus, got {other:?}"),
        }
    }

    #[test]
    fn decode_snapshot_with_missing_collections() {
        let payload = json!({
            "type": "snapshot",
            "alerts": [{
                "id": "a1",
                "title": "t",
                "message": "m",
                "severity": "info",
                "status": "pending",
                "createdAt": "2026-03-02T09:15:00Z"
            }]
        })
        .to_string();

        match decode_event(&payload) {
            Some(StreamEvent::Snapshot {
                alerts,
                users,
                devices,
            }) => {
                assert_eq!(alerts.len(), 1);
                assert!(users.is_empty());
                assert!(devices.is_empty());
            }
            other => panic!("expected Snapshot, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_dropped() {
        let payload = json!({"type": "maintenance_window", "until": "soon"}).to_string();
        assert!(decode_event(&payload).is_none());
    }

    #[test]
    fn malformed_payload_is_dropped() {
        assert!(decode_event("not json at all").is_none());
    }

    #[test]
    fn known_type_with_missing_fields_is_dropped() {
        // An alert_created with no alert payload is malformed, not partial.
        let payload = json!({"type": "alert_created"}).to_string();
        assert!(decode_event(&payload).is_none());
    }

    // ── Backoff ──────────────────────────────────────────────────────

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        // Each step should roughly double (within jitter bounds)
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }
}
