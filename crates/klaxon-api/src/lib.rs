// klaxon-api: Async client for the Klaxon admin API (REST + event stream)

pub mod admin;
pub mod error;
pub mod stream;
pub mod transport;
pub mod types;

pub use admin::{AdminClient, NewDevice, NewUser, TriggerAlert};
pub use error::Error;
pub use stream::{EventStreamHandle, ReconnectConfig, StreamEvent, StreamState};
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    Alert, AlertStatus, DeliveryLog, DeliveryStatus, Device, Platform, Role, Severity, User,
};
