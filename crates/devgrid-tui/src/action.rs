//! All possible UI actions. Actions are the sole mechanism for state mutation.

use std::collections::HashSet;
use std::sync::Arc;

use devgrid_core::{
    CommandDispatcher, Device, DeviceGrid, DeviceId, DispatchEvent, DispatchOutcome,
    GridController, GridRow,
};

/// Notification severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A toast notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Success,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Error,
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Info,
        }
    }
}

/// What the grid screen draws: the rendered grid plus which devices
/// have a command in flight.
#[derive(Debug, Clone, Default)]
pub struct GridSnapshot {
    pub grid: Arc<DeviceGrid>,
    pub pending: Arc<HashSet<DeviceId>>,
}

impl GridSnapshot {
    pub fn capture<D: CommandDispatcher>(controller: &GridController<D>) -> Self {
        let grid = controller.grid();
        let pending = grid
            .rows()
            .iter()
            .filter_map(GridRow::as_device)
            .filter(|row| controller.is_pending(row.id().as_str()))
            .map(|row| row.id().clone())
            .collect();

        Self {
            grid: Arc::new(grid.clone()),
            pending: Arc::new(pending),
        }
    }

    pub fn is_pending(&self, id: &DeviceId) -> bool {
        self.pending.contains(id)
    }
}

/// Every state transition in the TUI is expressed as an Action.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Lifecycle ──────────────────────────────────────────────────
    Quit,
    Tick,
    Render,

    // ── Initial load (from the data bridge) ───────────────────────
    DevicesLoaded(Arc<Vec<Device>>),
    LoadFailed(String),

    // ── Grid ──────────────────────────────────────────────────────
    GridUpdated(GridSnapshot),
    /// Dispatch the affordance at (`row`, `index`).
    Activate { row: usize, index: usize },
    DispatchCompleted(DispatchOutcome),
    DispatchObserved(DispatchEvent),

    // ── Help ──────────────────────────────────────────────────────
    ToggleHelp,

    // ── Notifications ─────────────────────────────────────────────
    Notify(Notification),
}
