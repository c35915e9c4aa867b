// ── Event reconciliation ──
//
// Maps each decoded stream event onto the single store mutation it
// implies. Pure dispatch, no I/O: the table is testable without a live
// stream. Events referencing unknown ids are logged no-ops -- an
// expected race between the snapshot boundary and in-flight deltas.

use tracing::debug;

use klaxon_api::StreamEvent;

use crate::store::{ConsoleStore, LOG_CAPACITY};

/// Apply one stream event to the store.
///
/// Called from the session's consumer task only, one event at a time in
/// arrival order. Each arm is one indivisible store mutation; partially
/// applied updates are never observable.
pub(crate) fn apply(store: &ConsoleStore, event: StreamEvent) {
    match event {
        StreamEvent::Snapshot {
            alerts,
            users,
            devices,
        } => {
            debug!(
                alerts = alerts.len(),
                users = users.len(),
                devices = devices.len(),
                "applying stream snapshot"
            );
            store.apply_snapshot(alerts, users, devices);
        }

        StreamEvent::AlertCreated { alert } => {
            store.alerts.prepend(alert);
        }

        StreamEvent::AlertStatus {
            alert_id,
            status,
            total_targets,
        } => {
            let known = store.alerts.patch(&alert_id, |alert| {
                alert.status = status;
                if let Some(total) = total_targets {
                    alert.total_targets = total;
                }
            });
            if !known {
                debug!(%alert_id, "status update for unknown alert");
            }
        }

        StreamEvent::AlertAcknowledged {
            alert_id,
            acknowledged_count,
        } => {
            let known = store
                .alerts
                .patch(&alert_id, |alert| alert.acknowledged_count = acknowledged_count);
            if !known {
                debug!(%alert_id, "acknowledgement for unknown alert");
            }
        }

        StreamEvent::DeliveryLog { log } => {
            store.logs.prepend_capped(log, LOG_CAPACITY);
        }

        StreamEvent::UserCreated { user } => {
            store.users.prepend(user);
        }

        StreamEvent::UserDeleted { id } => {
            store.users.remove(&id);
        }

        StreamEvent::DeviceRegistered { device } => {
            store.devices.prepend(device);
        }

        StreamEvent::DeviceToggled { device } => {
            let id = device.id.clone();
            if !store.devices.replace(device) {
                debug!(%id, "toggle for unknown device");
            }
        }

        // Filtered out by the stream client; nothing to apply.
        StreamEvent::Unknown => return,
    }

    store.note_event();
}
