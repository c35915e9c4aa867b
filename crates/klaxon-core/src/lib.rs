//! Live state-synchronization layer between the Klaxon admin API and UI
//! consumers.
//!
//! This crate keeps an in-memory, multi-entity view (alerts, users,
//! devices, delivery logs) consistent across two data sources: a one-shot
//! bulk snapshot fetched over REST, and a long-lived server-pushed event
//! stream delivering incremental deltas.
//!
//! - **[`Session`]** — Lifecycle facade: [`connect()`](Session::connect)
//!   performs the concurrent four-collection snapshot load, then spawns a
//!   single consumer task that drains the event stream in arrival order.
//!   [`disconnect()`](Session::disconnect) tears everything down; no
//!   dangling subscription survives it.
//!
//! - **[`ConsoleStore`]** — The single authoritative in-memory
//!   representation: four ordered, most-recent-first collections with the
//!   log list capped at [`LOG_CAPACITY`] entries. Mutations republish
//!   per-collection snapshots through `watch` channels.
//!
//! - **[`EntityStream<T>`]** — Read-only subscription handle vended by
//!   the store. Exposes `current()` / `latest()` / `changed()` for
//!   reactive rendering; consumers never mutate the store.
//!
//! - **Reconciler** (internal) — The dispatch table mapping each typed
//!   stream event to exactly one store mutation, including full-snapshot
//!   replacement and log-buffer capping.
//!
//! The wire/domain model ([`Alert`], [`User`], [`Device`],
//! [`DeliveryLog`]) is defined in `klaxon-api` and re-exported here at
//! the crate root for ergonomics.

pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod stream;

mod reconcile;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ConsoleConfig;
pub use error::CoreError;
pub use session::{ConnectionState, Session};
pub use store::{AlertTotals, ConsoleStore, LOG_CAPACITY};
pub use stream::EntityStream;

// Re-export the wire/domain model at the crate root for ergonomics.
pub use klaxon_api::{
    Alert, AlertStatus, DeliveryLog, DeliveryStatus, Device, NewDevice, NewUser, Platform,
    ReconnectConfig, Role, Severity, StreamEvent, TlsMode, TransportConfig, TriggerAlert, User,
};
