// ── Admin API wire types ──
//
// Records as the platform serves them: camelCase field names, lowercase
// string enums, RFC 3339 timestamps. These double as the domain model --
// there is a single API surface, so no separate canonical layer exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Alerts ──────────────────────────────────────────────────────────

/// How urgent an alert is, as chosen by the triggering operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Delivery progress of an alert across its target devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Sending,
    Delivered,
    Partial,
    Failed,
}

impl AlertStatus {
    /// Whether delivery is still in progress.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Sending)
    }
}

/// A triggered emergency alert. `status` and the two counters keep
/// mutating after creation as delivery progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    #[serde(default)]
    pub total_targets: u32,
    #[serde(default)]
    pub acknowledged_count: u32,
    pub created_at: DateTime<Utc>,
}

// ── Users ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

/// A registered user. Immutable once created; the only lifecycle event
/// after creation is removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// ── Devices ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Ios,
    Android,
}

/// A push-notification endpoint registered for a user. `active` is
/// toggled in place by operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub user_email: String,
    pub platform: Platform,
    pub token: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ── Delivery logs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Delivered,
    Failed,
}

/// One delivery attempt of one alert to one device token.
///
/// `alert_id` references [`Alert::id`] but is not enforced -- logs can
/// outlive or precede the alert they refer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLog {
    pub id: String,
    pub alert_id: String,
    pub device_token: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
