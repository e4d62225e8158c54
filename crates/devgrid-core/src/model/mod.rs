// ── Domain model ──

mod device;

pub use device::{Device, DeviceId, StateUpdate};
