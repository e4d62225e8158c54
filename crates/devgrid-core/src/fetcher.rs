// ── Device list fetcher ──
//
// Retrieves the whole collection once and puts it in grid order:
// type name, then device name, both case-insensitive, ties in backend
// order. A failed fetch never yields a partial list.

use std::collections::HashSet;
use std::future::Future;

use devgrid_api::DeviceApiClient;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::model::Device;

/// Anything that can produce the raw device collection.
pub trait DeviceSource: Send + Sync {
    fn list_devices(&self) -> impl Future<Output = Result<Vec<Device>, FetchError>> + Send;
}

impl DeviceSource for DeviceApiClient {
    async fn list_devices(&self) -> Result<Vec<Device>, FetchError> {
        let records = DeviceApiClient::list_devices(self).await?;
        Ok(records.into_iter().map(Device::from).collect())
    }
}

/// Fetches and orders the device collection.
#[derive(Debug, Clone)]
pub struct DeviceListFetcher<S> {
    source: S,
}

impl<S: DeviceSource> DeviceListFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch all devices, sorted for rendering.
    ///
    /// Fails with [`FetchError::DuplicateId`] when two entries share an id,
    /// since rows are looked up by id afterwards.
    pub async fn fetch_devices(&self) -> Result<Vec<Device>, FetchError> {
        debug!("fetching device collection");
        let mut devices = self.source.list_devices().await?;

        ensure_unique_ids(&devices)?;
        sort_devices(&mut devices);

        info!(count = devices.len(), "device collection loaded");
        Ok(devices)
    }
}

/// Sort by `type_name` then `name`, case-insensitively.
///
/// The sort is stable: entries whose keys compare equal ignoring case keep
/// their original relative order.
pub fn sort_devices(devices: &mut [Device]) {
    devices.sort_by_cached_key(|d| (d.type_name.to_lowercase(), d.name.to_lowercase()));
}

fn ensure_unique_ids(devices: &[Device]) -> Result<(), FetchError> {
    let mut seen = HashSet::with_capacity(devices.len());
    for device in devices {
        if !seen.insert(device.id.as_str()) {
            return Err(FetchError::DuplicateId {
                id: device.id.to_string(),
            });
        }
    }
    Ok(())
}
