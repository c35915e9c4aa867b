// Hand-crafted async HTTP client for the Klaxon admin API.
//
// Base path: /admin/
// Auth: optional `Authorization: Bearer` header, injected at build time.

use reqwest::header::HeaderMap;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::stream::{EventStreamHandle, ReconnectConfig, StreamEvent};
use crate::transport::{TransportConfig, bearer_headers};
use crate::types::{Alert, DeliveryLog, Device, Platform, Role, Severity, User};

// ── Error response shape from the admin API ──────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

// ── Response envelopes ───────────────────────────────────────────────
//
// Each list endpoint wraps its collection in a named field. A missing
// field decodes as an empty collection.

#[derive(serde::Deserialize)]
struct AlertsEnvelope {
    #[serde(default)]
    alerts: Vec<Alert>,
}

#[derive(serde::Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(serde::Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(serde::Deserialize)]
struct LogsEnvelope {
    #[serde(default)]
    logs: Vec<DeliveryLog>,
}

// ── Write request bodies ─────────────────────────────────────────────

/// Body for `POST /admin/alerts` -- trigger a new alert.
///
/// `target` names the audience (`"all"` or a platform-defined group);
/// audience resolution happens server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAlert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub target: String,
}

/// Body for `POST /admin/users`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Body for `POST /admin/devices` -- register a push endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub user_email: String,
    pub platform: Platform,
    pub token: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the admin endpoints.
///
/// Covers the four bulk list endpoints the snapshot load consumes and the
/// console's write operations. State changes caused by writes are never
/// applied locally -- they come back through the event stream.
pub struct AdminClient {
    http: reqwest::Client,
    /// Separate client for the event stream: no total request timeout.
    stream_http: reqwest::Client,
    base_url: Url,
}

impl AdminClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a base URL and transport config, injecting the bearer
    /// token as a default header on every request.
    pub fn new(
        base_url: &Url,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let headers = match token {
            Some(token) => bearer_headers(token)?,
            None => HeaderMap::new(),
        };
        let http = transport.build_client(headers.clone())?;
        let stream_http = transport.build_streaming_client(headers)?;

        Ok(Self {
            http,
            stream_http,
            base_url: normalize_base_url(base_url),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    /// The same client is used for the event stream, so it should carry
    /// no total request timeout.
    pub fn from_reqwest(base_url: &Url, http: reqwest::Client) -> Self {
        Self {
            stream_http: http.clone(),
            http,
            base_url: normalize_base_url(base_url),
        }
    }

    // ── Bulk list endpoints (snapshot load) ──────────────────────────

    pub async fn list_alerts(&self) -> Result<Vec<Alert>, Error> {
        let env: AlertsEnvelope = self.get("admin/alerts").await?;
        Ok(env.alerts)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        let env: UsersEnvelope = self.get("admin/users").await?;
        Ok(env.users)
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, Error> {
        let env: DevicesEnvelope = self.get("admin/devices").await?;
        Ok(env.devices)
    }

    pub async fn list_logs(&self) -> Result<Vec<DeliveryLog>, Error> {
        let env: LogsEnvelope = self.get("admin/logs").await?;
        Ok(env.logs)
    }

    // ── Write operations ─────────────────────────────────────────────

    /// Trigger a new alert. The created record arrives as an
    /// `alert_created` stream event.
    pub async fn trigger_alert(&self, alert: &TriggerAlert) -> Result<(), Error> {
        self.post_no_response("admin/alerts", alert).await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<(), Error> {
        self.post_no_response("admin/users", user).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("admin/users/{id}")).await
    }

    pub async fn register_device(&self, device: &NewDevice) -> Result<(), Error> {
        self.post_no_response("admin/devices", device).await
    }

    /// Flip a device's `active` flag. The updated record arrives as a
    /// `device_toggled` stream event.
    pub async fn toggle_device(&self, id: &str) -> Result<(), Error> {
        self.patch_no_response(&format!("admin/devices/{id}/toggle"))
            .await
    }

    // ── Event stream ─────────────────────────────────────────────────

    /// URL of the persistent event stream endpoint.
    pub fn stream_url(&self) -> Url {
        self.url("admin/stream")
    }

    /// Open the persistent event-stream subscription.
    ///
    /// Spawns the reconnecting read loop and returns its handle plus the
    /// single event receiver. Reuses this client's auth headers and TLS
    /// settings on a timeout-free connection.
    pub fn subscribe_stream(
        &self,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (EventStreamHandle, mpsc::Receiver<StreamEvent>) {
        EventStreamHandle::connect(
            self.stream_http.clone(),
            self.stream_url(),
            reconnect,
            cancel,
        )
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Url {
        // base_url always ends with '/', so joining "admin/…" works.
        self.base_url
            .join(path)
            .expect("path should be valid relative URL")
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path);
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        handle_response(resp).await
    }

    async fn post_no_response<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), Error> {
        let url = self.url(path);
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        handle_empty(resp).await
    }

    async fn patch_no_response(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path);
        debug!("PATCH {url}");

        let resp = self.http.patch(url).send().await?;
        handle_empty(resp).await
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path);
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        handle_empty(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    if status.is_success() {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = &body[..body.len().min(200)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Error::Unauthorized;
    }

    let raw = resp.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorResponse>(&raw)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| status.to_string());

    Error::Api {
        status: status.as_u16(),
        message,
    }
}

/// Ensure the base URL path ends with '/' so relative joins append.
fn normalize_base_url(raw: &Url) -> Url {
    let mut url = raw.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
