// devgrid-api: Async Rust client for device registry backends
//
// Two endpoints, no envelope: `GET /api/devices` for the listing and
// `POST /api/device/{id}` for command execution.

pub mod client;
pub mod devices;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{BodyEncoding, DeviceApiClient};
pub use error::Error;
pub use models::{CommandAck, CommandRequest, DeviceRecord, WireId, WireState};
pub use transport::{TlsMode, TransportConfig};
