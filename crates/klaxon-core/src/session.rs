// ── Session lifecycle ──
//
// Full lifecycle management for a console session: one-shot concurrent
// snapshot load, the live event-stream subscription, reconciliation
// through a single consumer task, and teardown.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use klaxon_api::stream::{StreamEvent, StreamState};
use klaxon_api::{
    AdminClient, Alert, DeliveryLog, Device, EventStreamHandle, NewDevice, NewUser, TriggerAlert,
    User,
};

use crate::config::ConsoleConfig;
use crate::error::CoreError;
use crate::reconcile;
use crate::store::ConsoleStore;
use crate::stream::EntityStream;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
///
/// `Reconnecting` is the degraded-state signal: the snapshot is intact
/// but live deltas are not flowing, so the view may lag server truth
/// until the stream recovers and resynchronizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

// ── Session ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SessionInner>`. [`connect()`](Self::connect)
/// seeds the store and starts the live stream; reads go through the
/// [`store()`](Self::store) snapshots or the `EntityStream` accessors.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ConsoleConfig,
    store: Arc<ConsoleStore>,
    client: AdminClient,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection — cancelled on disconnect,
    /// replaced on reconnect (avoids permanent cancellation).
    cancel_child: Mutex<CancellationToken>,
    /// Event stream handle (populated on connect if enabled).
    stream_handle: Mutex<Option<EventStreamHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Create a new Session from configuration. Does NOT load or
    /// subscribe -- call [`connect()`](Self::connect) for that.
    pub fn new(config: ConsoleConfig) -> Result<Self, CoreError> {
        let client = AdminClient::new(
            &config.base_url,
            config.api_token.as_ref(),
            &config.transport,
        )?;
        let store = Arc::new(ConsoleStore::new());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                store,
                client,
                connection_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                stream_handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the session configuration.
    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<ConsoleStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect the session: load the initial snapshot, then subscribe to
    /// the live event stream.
    ///
    /// The snapshot load fetches all four collections concurrently and is
    /// all-or-nothing -- if any fetch fails the store stays untouched and
    /// the error is returned. Calling `connect()` on a session that is
    /// already connecting or connected is rejected with
    /// [`CoreError::AlreadyConnected`].
    pub async fn connect(&self) -> Result<(), CoreError> {
        let prev = self
            .inner
            .connection_state
            .send_replace(ConnectionState::Connecting);
        if !matches!(
            prev,
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.inner.connection_state.send_replace(prev);
            return Err(CoreError::AlreadyConnected);
        }

        // Fresh child token for this connection (supports reconnect).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        // Initial snapshot: all four collections, all-or-nothing.
        if let Err(e) = self.load_snapshot().await {
            let _ = self.inner.connection_state.send(ConnectionState::Failed);
            return Err(e);
        }

        // Live event stream + the single consumer task.
        if self.inner.config.stream_enabled {
            let (handle, events) = self
                .inner
                .client
                .subscribe_stream(self.inner.config.reconnect.clone(), child.child_token());
            let stream_state = handle.state();
            *self.inner.stream_handle.lock().await = Some(handle);

            let session = self.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(stream_consumer_task(
                    session,
                    events,
                    stream_state,
                    child,
                )));
        }

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!("console session connected");
        Ok(())
    }

    /// Disconnect the session.
    ///
    /// Cancels the stream subscription and the consumer task, joins them,
    /// and resets the state to [`Disconnected`](ConnectionState::Disconnected).
    /// No subscription survives this call; `connect()` may be called
    /// again afterwards.
    pub async fn disconnect(&self) {
        // Cancel the child token (not the parent — allows reconnect).
        self.inner.cancel_child.lock().await.cancel();

        // Join background tasks so no writer outlives the call.
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(handle) = self.inner.stream_handle.lock().await.take() {
            handle.shutdown();
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("console session disconnected");
    }

    /// Explicitly reload all four collections from the admin API.
    ///
    /// Intended for stream-disabled sessions and operator-driven reloads.
    /// Like the initial load, it is all-or-nothing.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.load_snapshot().await
    }

    /// Fetch all four collections concurrently and seed the store.
    ///
    /// Fan-out/fan-in: the four requests run in parallel and the store is
    /// only touched after every one of them has succeeded -- a single
    /// failure fails the load as a whole, never leaving some collections
    /// populated and others silently empty.
    async fn load_snapshot(&self) -> Result<(), CoreError> {
        let client = &self.inner.client;
        let (alerts, users, devices, logs) = tokio::try_join!(
            client.list_alerts(),
            client.list_users(),
            client.list_devices(),
            client.list_logs(),
        )?;

        debug!(
            alerts = alerts.len(),
            users = users.len(),
            devices = devices.len(),
            logs = logs.len(),
            "snapshot load complete"
        );

        let store = &self.inner.store;
        store.apply_snapshot(alerts, users, devices);
        store.replace_logs(logs);
        store.mark_synced();
        Ok(())
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to connection-state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn alerts(&self) -> EntityStream<Alert> {
        self.inner.store.subscribe_alerts()
    }

    pub fn users(&self) -> EntityStream<User> {
        self.inner.store.subscribe_users()
    }

    pub fn devices(&self) -> EntityStream<Device> {
        self.inner.store.subscribe_devices()
    }

    pub fn logs(&self) -> EntityStream<DeliveryLog> {
        self.inner.store.subscribe_logs()
    }

    // ── Write passthroughs ───────────────────────────────────────────
    //
    // Thin request forwarding: the resulting state changes are never
    // applied locally, they come back through the event stream.

    pub async fn trigger_alert(&self, alert: &TriggerAlert) -> Result<(), CoreError> {
        Ok(self.inner.client.trigger_alert(alert).await?)
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<(), CoreError> {
        Ok(self.inner.client.create_user(user).await?)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), CoreError> {
        Ok(self.inner.client.delete_user(id).await?)
    }

    pub async fn register_device(&self, device: &NewDevice) -> Result<(), CoreError> {
        Ok(self.inner.client.register_device(device).await?)
    }

    pub async fn toggle_device(&self, id: &str) -> Result<(), CoreError> {
        Ok(self.inner.client.toggle_device(id).await?)
    }
}

// ── Consumer task ────────────────────────────────────────────────────

/// The single writer for the store.
///
/// Drains stream events strictly in arrival order -- each event's
/// reconciliation completes before the next is taken -- and reacts to
/// stream-state transitions: reconnects surface as `Reconnecting`, and a
/// recovered stream triggers a full resync because deltas pushed during
/// the outage are irrecoverably lost.
async fn stream_consumer_task(
    session: Session,
    mut events: mpsc::Receiver<StreamEvent>,
    mut stream_state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
) {
    let mut was_down = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                match event {
                    Some(event) => reconcile::apply(&session.inner.store, event),
                    None => break, // stream loop exited
                }
            }
            changed = stream_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *stream_state.borrow_and_update();
                match state {
                    StreamState::Open if was_down => {
                        was_down = false;
                        // Reload ground truth before trusting deltas again.
                        // Events buffered during the reload apply afterwards
                        // and are idempotent against the fresher snapshot.
                        info!("event stream recovered, resynchronizing");
                        if let Err(e) = session.load_snapshot().await {
                            warn!(error = %e, "resync failed; awaiting server snapshot event");
                        }
                        let _ = session
                            .inner
                            .connection_state
                            .send(ConnectionState::Connected);
                    }
                    StreamState::Open => {
                        let _ = session
                            .inner
                            .connection_state
                            .send(ConnectionState::Connected);
                    }
                    StreamState::Backoff { attempt } => {
                        was_down = true;
                        let _ = session
                            .inner
                            .connection_state
                            .send(ConnectionState::Reconnecting { attempt });
                    }
                    StreamState::Connecting => {}
                    StreamState::Closed => {
                        if !cancel.is_cancelled() {
                            warn!("event stream closed permanently");
                            let _ = session.inner.connection_state.send(ConnectionState::Failed);
                        }
                        break;
                    }
                }
            }
        }
    }

    debug!("stream consumer exiting");
}
