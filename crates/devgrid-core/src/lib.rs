// devgrid-core: Device grid state and command dispatch shared by the CLI and TUI.

pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod fetcher;
pub mod grid;
pub mod model;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, DispatchPolicy, TlsVerification};
pub use controller::{
    Applied, CommandDispatcher, DispatchEvent, DispatchEventKind, DispatchOutcome,
    DispatchTicket, GridController,
};
pub use error::{DispatchError, FetchError};
pub use fetcher::{DeviceListFetcher, DeviceSource, sort_devices};
pub use grid::{Affordance, DeviceGrid, DeviceRow, GridRow};
pub use model::{Device, DeviceId, StateUpdate};

pub use devgrid_api::{BodyEncoding, DeviceApiClient};
