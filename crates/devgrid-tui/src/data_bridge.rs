//! Data bridge: connects the backend and the dispatch machinery to TUI actions.
//!
//! Runs as a background task: performs the single startup fetch, then
//! forwards every dispatch completion and dispatch event as an
//! [`Action`] through the TUI's action channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devgrid_core::{DeviceListFetcher, DeviceSource, DispatchEvent, DispatchOutcome};

use crate::action::Action;

/// Spawn-able bridge between the controller's channels and the action loop.
///
/// The collection is fetched exactly once; there is no refresh.
pub async fn spawn_data_bridge<S: DeviceSource>(
    fetcher: DeviceListFetcher<S>,
    mut completions: mpsc::UnboundedReceiver<DispatchOutcome>,
    mut events: broadcast::Receiver<DispatchEvent>,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = fetcher.fetch_devices() => match result {
            Ok(devices) => {
                info!(count = devices.len(), "devices loaded");
                let _ = action_tx.send(Action::DevicesLoaded(Arc::new(devices)));
            }
            Err(e) => {
                warn!(error = %e, "failed to load devices");
                let _ = action_tx.send(Action::LoadFailed(e.to_string()));
            }
        },
    }

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            Some(outcome) = completions.recv() => {
                let _ = action_tx.send(Action::DispatchCompleted(outcome));
            }

            event = events.recv() => match event {
                Ok(event) => {
                    let _ = action_tx.send(Action::DispatchObserved(event));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "dispatch events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    debug!("data bridge shut down");
}
