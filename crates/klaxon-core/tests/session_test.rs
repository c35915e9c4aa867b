#![allow(clippy::unwrap_used)]
// End-to-end session tests against a wiremock backend: concurrent
// snapshot load, all-or-nothing failure, live event application, and
// teardown.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use klaxon_core::{
    AlertStatus, ConnectionState, ConsoleConfig, CoreError, ReconnectConfig, Session,
};

// ── Fixtures ────────────────────────────────────────────────────────

fn alert_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": "Severe weather",
        "message": "Seek shelter",
        "severity": "warning",
        "status": status,
        "totalTargets": 50,
        "acknowledgedCount": 0,
        "createdAt": "2026-03-02T08:00:00Z"
    })
}

fn user_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Riley",
        "email": format!("{id}@example.edu"),
        "role": "staff",
        "createdAt": "2026-03-01T12:00:00Z"
    })
}

fn device_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "userEmail": "riley@example.edu",
        "platform": "ios",
        "token": format!("tok-{id}"),
        "active": true,
        "createdAt": "2026-03-01T12:30:00Z"
    })
}

fn log_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "alertId": "a1",
        "deviceToken": "tok-d1",
        "status": "delivered",
        "timestamp": "2026-03-02T08:01:00Z"
    })
}

/// Mount the four list endpoints with the given payloads.
async fn mount_lists(
    server: &MockServer,
    alerts: serde_json::Value,
    users: serde_json::Value,
    devices: serde_json::Value,
    logs: serde_json::Value,
) {
    for (route, body) in [
        ("/admin/alerts", alerts),
        ("/admin/users", users),
        ("/admin/devices", devices),
        ("/admin/logs", logs),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

/// Mount the stream endpoint with a fixed SSE body.
async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/admin/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body.into_bytes(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect::<String>()
}

fn config_for(server: &MockServer) -> ConsoleConfig {
    let mut config = ConsoleConfig::new(Url::parse(&server.uri()).unwrap());
    // The mock stream body replays on every reconnect; keep the replay
    // cycle well clear of the assertions.
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(4),
        max_retries: None,
    };
    config
}

/// Poll until `check` passes or five seconds elapse.
async fn wait_until(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

// ── Snapshot load ───────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_all_four_collections() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": [alert_json("a1", "pending"), alert_json("a2", "delivered")]}),
        json!({"users": [user_json("u1")]}),
        json!({"devices": [device_json("d1")]}),
        json!({"logs": [log_json("L1")]}),
    )
    .await;
    // Keep the stream pending so this test only exercises the load.
    Mock::given(method("GET"))
        .and(path("/admin/stream"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&server)
        .await;

    let session = Session::new(config_for(&server)).unwrap();
    session.connect().await.unwrap();

    let store = session.store();
    assert_eq!(store.alert_count(), 2);
    assert_eq!(store.user_count(), 1);
    assert_eq!(store.device_count(), 1);
    assert_eq!(store.log_count(), 1);
    assert!(store.last_sync().is_some());
    assert_eq!(
        *session.connection_state().borrow(),
        ConnectionState::Connected
    );

    session.disconnect().await;
}

#[tokio::test]
async fn missing_envelope_fields_load_as_empty() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": [alert_json("a1", "pending")]}),
        json!({}),
        json!({}),
        json!({}),
    )
    .await;

    let mut config = config_for(&server);
    config.stream_enabled = false;
    let session = Session::new(config).unwrap();
    session.connect().await.unwrap();

    assert_eq!(session.store().alert_count(), 1);
    assert_eq!(session.store().user_count(), 0);
    assert_eq!(session.store().device_count(), 0);
    assert_eq!(session.store().log_count(), 0);
}

#[tokio::test]
async fn one_failed_fetch_fails_the_whole_load() {
    let server = MockServer::start().await;
    // Three endpoints succeed, users fails: the load must be rejected as
    // a whole.
    Mock::given(method("GET"))
        .and(path("/admin/users"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .mount(&server)
        .await;
    mount_lists(
        &server,
        json!({"alerts": [alert_json("a1", "pending")]}),
        json!({"users": [user_json("u1")]}),
        json!({"devices": [device_json("d1")]}),
        json!({"logs": [log_json("L1")]}),
    )
    .await;

    let mut config = config_for(&server);
    config.stream_enabled = false;
    let session = Session::new(config).unwrap();

    let result = session.connect().await;
    assert!(matches!(result, Err(CoreError::Api { .. })), "got {result:?}");

    // No collection was partially populated from the fetches.
    let store = session.store();
    assert_eq!(store.alert_count(), 0);
    assert_eq!(store.user_count(), 0);
    assert_eq!(store.device_count(), 0);
    assert_eq!(store.log_count(), 0);
    assert!(store.last_sync().is_none());
    assert_eq!(
        *session.connection_state().borrow(),
        ConnectionState::Failed
    );
}

#[tokio::test]
async fn reconnect_after_failed_connect_is_allowed() {
    let server = MockServer::start().await;
    // The first four fetches 500 ("warming up"), then the backend is
    // healthy and later mounts take over.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "warming up"})))
        .up_to_n_times(4)
        .mount(&server)
        .await;
    mount_lists(
        &server,
        json!({"alerts": []}),
        json!({"users": [user_json("u1")]}),
        json!({"devices": []}),
        json!({"logs": []}),
    )
    .await;

    let mut config = config_for(&server);
    config.stream_enabled = false;
    let session = Session::new(config).unwrap();
    assert!(session.connect().await.is_err());

    session.connect().await.unwrap();
    assert_eq!(session.store().user_count(), 1);
}

// ── Re-entrancy guard ───────────────────────────────────────────────

#[tokio::test]
async fn connect_twice_is_rejected() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": []}),
        json!({"users": []}),
        json!({"devices": []}),
        json!({"logs": []}),
    )
    .await;

    let mut config = config_for(&server);
    config.stream_enabled = false;
    let session = Session::new(config).unwrap();
    session.connect().await.unwrap();

    let result = session.connect().await;
    assert!(matches!(result, Err(CoreError::AlreadyConnected)));
    // The guard must not clobber the live connection state.
    assert_eq!(
        *session.connection_state().borrow(),
        ConnectionState::Connected
    );
}

// ── Live event application ──────────────────────────────────────────

#[tokio::test]
async fn stream_events_apply_in_arrival_order() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": [alert_json("a1", "pending")]}),
        json!({"users": []}),
        json!({"devices": []}),
        json!({"logs": []}),
    )
    .await;
    mount_stream(
        &server,
        sse(&[
            json!({"type": "user_created", "user": user_json("u1")}),
            json!({"type": "device_registered", "device": device_json("d1")}),
            json!({"type": "alert_status", "alertId": "a1", "status": "delivered", "totalTargets": 10}),
            json!({"type": "alert_acknowledged", "alertId": "a1", "acknowledgedCount": 5}),
            json!({"type": "delivery_log", "log": log_json("L1")}),
            // Unknown types must flow past without disturbing the stream.
            json!({"type": "shiny_new_feature", "x": 1}),
        ]),
    )
    .await;

    let session = Session::new(config_for(&server)).unwrap();
    session.connect().await.unwrap();

    let store = session.store().clone();
    wait_until(|| store.log_count() == 1 && store.alert_totals().acknowledged == 5).await;

    let a1 = store.alert_by_id("a1").unwrap();
    assert_eq!(a1.status, AlertStatus::Delivered);
    assert_eq!(a1.total_targets, 10);
    assert_eq!(a1.acknowledged_count, 5);
    assert_eq!(store.user_count(), 1);
    assert_eq!(store.device_count(), 1);
    assert_eq!(store.logs_snapshot()[0].id, "L1");
    assert!(store.last_event().is_some());

    session.disconnect().await;
}

#[tokio::test]
async fn stream_snapshot_event_supersedes_loaded_state() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": [alert_json("a1", "pending")]}),
        json!({"users": [user_json("u1")]}),
        json!({"devices": [device_json("d1")]}),
        json!({"logs": []}),
    )
    .await;
    // The pushed snapshot carries only users; missing collections mean
    // empty, so alerts and devices are wiped.
    mount_stream(
        &server,
        sse(&[json!({"type": "snapshot", "users": [user_json("u9")]})]),
    )
    .await;

    let session = Session::new(config_for(&server)).unwrap();
    session.connect().await.unwrap();

    let store = session.store().clone();
    wait_until(|| store.user_by_id("u9").is_some()).await;

    assert_eq!(store.user_count(), 1);
    assert_eq!(store.alert_count(), 0);
    assert_eq!(store.device_count(), 0);

    session.disconnect().await;
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_then_reconnect() {
    let server = MockServer::start().await;
    mount_lists(
        &server,
        json!({"alerts": []}),
        json!({"users": [user_json("u1")]}),
        json!({"devices": []}),
        json!({"logs": []}),
    )
    .await;
    mount_stream(&server, sse(&[])).await;

    let session = Session::new(config_for(&server)).unwrap();
    session.connect().await.unwrap();

    session.disconnect().await;
    assert_eq!(
        *session.connection_state().borrow(),
        ConnectionState::Disconnected
    );

    // A torn-down session can start over.
    session.connect().await.unwrap();
    assert_eq!(session.store().user_count(), 1);
    session.disconnect().await;
}
