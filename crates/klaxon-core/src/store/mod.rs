// ── Central reactive console store ──
//
// The single authoritative in-memory representation of all tracked
// collections. Mutations come exclusively from the snapshot loader and
// the reconciler; everything else reads snapshots or subscribes.

mod collection;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use klaxon_api::{Alert, AlertStatus, DeliveryLog, Device, User};

use crate::stream::EntityStream;
use collection::Keyed;
pub(crate) use collection::EntityList;

/// Upper bound on the delivery-log list. The oldest entries beyond the
/// cap are silently evicted on insertion.
pub const LOG_CAPACITY: usize = 500;

// ── Key accessors ────────────────────────────────────────────────────

impl Keyed for Alert {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for User {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Device {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for DeliveryLog {
    fn key(&self) -> &str {
        &self.id
    }
}

// ── AlertTotals ──────────────────────────────────────────────────────

/// Delivery counts derived from the current alert collection, as shown
/// on the console's summary tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertTotals {
    pub delivered: usize,
    pub failed: usize,
    pub partial: usize,
    /// Pending or sending.
    pub in_flight: usize,
    /// Sum of acknowledgement counters across all alerts.
    pub acknowledged: u64,
}

// ── ConsoleStore ─────────────────────────────────────────────────────

/// Central reactive store for the console's four collections.
///
/// All collections are ordered most-recent-first. Reads are snapshot
/// clones (`Arc`-cheap); writes are crate-internal and serialized by the
/// session's single consumer task.
pub struct ConsoleStore {
    pub(crate) alerts: EntityList<Alert>,
    pub(crate) users: EntityList<User>,
    pub(crate) devices: EntityList<Device>,
    pub(crate) logs: EntityList<DeliveryLog>,

    /// Bumped once per fully applied event or reload -- the coarse
    /// "state changed" signal for consumers that watch everything.
    changed: watch::Sender<u64>,

    /// When the last successful bulk load completed.
    last_sync: watch::Sender<Option<DateTime<Utc>>>,

    /// When the last stream event was applied.
    last_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl ConsoleStore {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0u64);
        let (last_sync, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            alerts: EntityList::new(),
            users: EntityList::new(),
            devices: EntityList::new(),
            logs: EntityList::new(),
            changed,
            last_sync,
            last_event,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn alerts_snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.alerts.snapshot()
    }

    pub fn users_snapshot(&self) -> Arc<Vec<Arc<User>>> {
        self.users.snapshot()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn logs_snapshot(&self) -> Arc<Vec<Arc<DeliveryLog>>> {
        self.logs.snapshot()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn alert_by_id(&self, id: &str) -> Option<Arc<Alert>> {
        self.alerts.get(id)
    }

    pub fn user_by_id(&self, id: &str) -> Option<Arc<User>> {
        self.users.get(id)
    }

    pub fn device_by_id(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    /// Derive the summary-tile counts from the current alerts.
    pub fn alert_totals(&self) -> AlertTotals {
        let snap = self.alerts.snapshot();
        let mut totals = AlertTotals::default();
        for alert in snap.as_ref() {
            match alert.status {
                AlertStatus::Delivered => totals.delivered += 1,
                AlertStatus::Failed => totals.failed += 1,
                AlertStatus::Partial => totals.partial += 1,
                AlertStatus::Pending | AlertStatus::Sending => totals.in_flight += 1,
            }
            totals.acknowledged += u64::from(alert.acknowledged_count);
        }
        totals
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_alerts(&self) -> EntityStream<Alert> {
        EntityStream::new(self.alerts.subscribe())
    }

    pub fn subscribe_users(&self) -> EntityStream<User> {
        EntityStream::new(self.users.subscribe())
    }

    pub fn subscribe_devices(&self) -> EntityStream<Device> {
        EntityStream::new(self.devices.subscribe())
    }

    pub fn subscribe_logs(&self) -> EntityStream<DeliveryLog> {
        EntityStream::new(self.logs.subscribe())
    }

    /// Subscribe to the coarse change counter: one tick per applied
    /// event or reload, across all collections.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.borrow()
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    /// How long ago the last bulk load completed, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_sync().map(|t| Utc::now() - t)
    }

    // ── Mutations (crate-internal) ───────────────────────────────────

    /// Atomically discard and replace the three entity collections.
    ///
    /// Used only by snapshot/resync application. A collection absent
    /// from the payload arrives here as an empty vec and replaces the
    /// stored one -- ground truth, not a merge.
    pub(crate) fn apply_snapshot(
        &self,
        alerts: Vec<Alert>,
        users: Vec<User>,
        devices: Vec<Device>,
    ) {
        self.alerts.replace_all(alerts);
        self.users.replace_all(users);
        self.devices.replace_all(devices);
    }

    /// Replace the delivery-log list from a bulk load, enforcing the cap.
    pub(crate) fn replace_logs(&self, mut logs: Vec<DeliveryLog>) {
        logs.truncate(LOG_CAPACITY);
        self.logs.replace_all(logs);
    }

    /// Record a completed bulk load and tick the change counter.
    pub(crate) fn mark_synced(&self) {
        let _ = self.last_sync.send(Some(Utc::now()));
        self.changed.send_modify(|v| *v += 1);
    }

    /// Record one applied stream event and tick the change counter.
    pub(crate) fn note_event(&self) {
        let _ = self.last_event.send(Some(Utc::now()));
        self.changed.send_modify(|v| *v += 1);
    }
}

impl Default for ConsoleStore {
    fn default() -> Self {
        Self::new()
    }
}
