// ── Rendered device grid ──
//
// The grid is the view model both front ends draw: header rows between
// type groups, one row per device, and per-row command affordances. It
// keeps an explicit id -> row index built at render time so a dispatch
// completion touches exactly one row without scanning.

use std::collections::HashMap;

use crate::model::{Device, DeviceId};

/// One command button on a device row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub command: String,
    pub device_id: DeviceId,
}

/// A rendered device row. Only `state` changes after render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    id: DeviceId,
    /// Leading cell, always empty; it lines device rows up under headers.
    pub leading: String,
    pub name: String,
    state: String,
    commands: Vec<Affordance>,
}

impl DeviceRow {
    fn from_device(device: &Device) -> Self {
        let commands = device
            .commands
            .iter()
            .map(|command| Affordance {
                command: command.clone(),
                device_id: device.id.clone(),
            })
            .collect();

        Self {
            id: device.id.clone(),
            leading: String::new(),
            name: device.name.clone(),
            state: device.state.clone(),
            commands,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn commands(&self) -> &[Affordance] {
        &self.commands
    }
}

/// A row in render order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridRow {
    /// Synthetic group header preceding the first device of a type.
    Header { type_name: String },
    Device(DeviceRow),
}

impl GridRow {
    pub fn as_device(&self) -> Option<&DeviceRow> {
        match self {
            Self::Device(row) => Some(row),
            Self::Header { .. } => None,
        }
    }
}

/// The grouped grid and its id index.
#[derive(Debug, Clone, Default)]
pub struct DeviceGrid {
    rows: Vec<GridRow>,
    index: HashMap<DeviceId, usize>,
}

impl DeviceGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the grid from an already-sorted device sequence.
    ///
    /// Any previous rows are discarded first, so rendering twice yields
    /// the same grid as rendering once. A header row is emitted whenever
    /// `type_name` differs (exactly) from the previous device's.
    pub fn render(&mut self, devices: &[Device]) {
        self.clear();
        self.rows.reserve(devices.len());

        let mut previous_type: Option<&str> = None;
        for device in devices {
            if previous_type != Some(device.type_name.as_str()) {
                self.rows.push(GridRow::Header {
                    type_name: device.type_name.clone(),
                });
                previous_type = Some(device.type_name.as_str());
            }

            // Ids are unique after a successful fetch; keep the first
            // occurrence if a caller renders an unchecked list.
            self.index
                .entry(device.id.clone())
                .or_insert(self.rows.len());
            self.rows.push(GridRow::Device(DeviceRow::from_device(device)));
        }
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Option<&GridRow> {
        self.rows.get(row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn device_count(&self) -> usize {
        self.index.len()
    }

    /// Row index of the device with this id.
    pub fn row_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn device_row(&self, id: &str) -> Option<&DeviceRow> {
        self.row_index(id)
            .and_then(|i| self.rows.get(i))
            .and_then(GridRow::as_device)
    }

    /// Indices of device rows, skipping headers, in render order.
    pub fn device_row_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.as_device().map(|_| i))
    }

    /// The affordance at `index` within `row`, if both exist.
    pub fn affordance(&self, row: usize, index: usize) -> Option<&Affordance> {
        self.rows
            .get(row)
            .and_then(GridRow::as_device)
            .and_then(|r| r.commands.get(index))
    }

    /// Overwrite the state cell of one device. Returns the patched row
    /// index, or `None` (and changes nothing) if the id is not rendered.
    pub fn patch_state(&mut self, id: &str, state: &str) -> Option<usize> {
        let row = self.row_index(id)?;
        match self.rows.get_mut(row) {
            Some(GridRow::Device(device)) => {
                state.clone_into(&mut device.state);
                Some(row)
            }
            _ => None,
        }
    }
}
