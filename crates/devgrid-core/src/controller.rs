// ── Grid controller ──
//
// Owns the rendered grid and every command dispatch against it. Each
// dispatch runs in its own task bounded by a timeout and a cancellation
// token; outcomes come back over an mpsc channel and are applied by the
// owner of the controller, so the grid itself is never shared.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use devgrid_api::DeviceApiClient;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, DispatchPolicy};
use crate::error::{DispatchError, FetchError};
use crate::fetcher::{DeviceListFetcher, DeviceSource};
use crate::grid::DeviceGrid;
use crate::model::{Device, DeviceId, StateUpdate};

const EVENT_CHANNEL_SIZE: usize = 64;

// ── CommandDispatcher ────────────────────────────────────────────

/// The capability to execute a named command on a device.
pub trait CommandDispatcher: Send + Sync + 'static {
    fn send_command(
        &self,
        id: &DeviceId,
        command: &str,
    ) -> impl Future<Output = Result<StateUpdate, DispatchError>> + Send;
}

impl CommandDispatcher for DeviceApiClient {
    async fn send_command(&self, id: &DeviceId, command: &str) -> Result<StateUpdate, DispatchError> {
        let ack = DeviceApiClient::send_command(self, id.as_str(), command).await?;
        Ok(ack.into())
    }
}

// ── Dispatch bookkeeping ─────────────────────────────────────────

/// Handle for one issued dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTicket {
    pub generation: u64,
    pub device_id: DeviceId,
    pub command: String,
}

/// A finished dispatch, waiting to be applied to the grid.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub generation: u64,
    /// The device the command was sent to.
    pub device_id: DeviceId,
    pub command: String,
    pub result: Result<StateUpdate, DispatchError>,
}

/// What [`GridController::apply`] did with an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The state cell of `row` now shows `update.state`.
    Patched { row: usize, update: StateUpdate },
    /// The dispatch was superseded; its outcome was dropped.
    Discarded,
}

/// Published to observers for every settled or superseded dispatch.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub device_id: DeviceId,
    pub command: String,
    pub kind: DispatchEventKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEventKind {
    Applied { state: String },
    Failed { error: DispatchError },
    Superseded,
}

struct InFlight {
    device_id: DeviceId,
    command: String,
    cancel: CancellationToken,
}

// ── GridController ───────────────────────────────────────────────

/// Renders the device grid and routes command activations to the backend.
///
/// Dispatching requires a running tokio runtime. Outcomes must be fed
/// back through [`apply`](Self::apply), either by awaiting
/// [`next_completion`](Self::next_completion) or by draining the receiver
/// from [`take_completions`](Self::take_completions).
pub struct GridController<D> {
    dispatcher: Arc<D>,
    grid: DeviceGrid,
    policy: DispatchPolicy,
    dispatch_timeout: Duration,
    in_flight: HashMap<u64, InFlight>,
    next_generation: u64,
    completion_tx: mpsc::UnboundedSender<DispatchOutcome>,
    completion_rx: Option<mpsc::UnboundedReceiver<DispatchOutcome>>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl GridController<DeviceApiClient> {
    /// Build a controller talking to the backend described by `config`.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, FetchError> {
        Ok(Self::new(config.api_client()?)
            .with_policy(config.dispatch_policy)
            .with_dispatch_timeout(config.dispatch_timeout))
    }
}

impl<D: CommandDispatcher> GridController<D> {
    pub fn new(dispatcher: D) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            dispatcher: Arc::new(dispatcher),
            grid: DeviceGrid::new(),
            policy: DispatchPolicy::default(),
            dispatch_timeout: ControllerConfig::DEFAULT_DISPATCH_TIMEOUT,
            in_flight: HashMap::new(),
            next_generation: 0,
            completion_tx,
            completion_rx: Some(completion_rx),
            event_tx,
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn grid(&self) -> &DeviceGrid {
        &self.grid
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    // ── Rendering ────────────────────────────────────────────────

    /// Rebuild the grid from a sorted device sequence.
    pub fn render(&mut self, devices: &[Device]) {
        self.grid.render(devices);
        debug!(
            rows = self.grid.len(),
            devices = self.grid.device_count(),
            "grid rendered"
        );
    }

    /// Fetch the collection once and render it.
    ///
    /// On failure the grid is left empty.
    pub async fn load<S: DeviceSource>(
        &mut self,
        fetcher: &DeviceListFetcher<S>,
    ) -> Result<usize, FetchError> {
        match fetcher.fetch_devices().await {
            Ok(devices) => {
                self.render(&devices);
                Ok(devices.len())
            }
            Err(e) => {
                self.grid.clear();
                Err(e)
            }
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// The single entry point for command activations on the grid.
    ///
    /// Resolves the affordance at (`row`, `index`) and dispatches it.
    pub fn activate(&mut self, row: usize, index: usize) -> Result<DispatchTicket, DispatchError> {
        let affordance = self
            .grid
            .affordance(row, index)
            .cloned()
            .ok_or(DispatchError::NoSuchAffordance { row, index })?;
        Ok(self.dispatch(affordance.device_id, affordance.command))
    }

    /// Send `command` to `device_id` in the background.
    ///
    /// Under [`DispatchPolicy::Supersede`] any earlier dispatch still in
    /// flight for the same device is cancelled first.
    pub fn dispatch(&mut self, device_id: DeviceId, command: impl Into<String>) -> DispatchTicket {
        let command = command.into();

        if self.policy == DispatchPolicy::Supersede {
            self.supersede(&device_id);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();

        self.in_flight.insert(
            generation,
            InFlight {
                device_id: device_id.clone(),
                command: command.clone(),
                cancel: cancel.clone(),
            },
        );

        debug!(%device_id, %command, generation, "dispatching command");
        tokio::spawn(run_dispatch(
            Arc::clone(&self.dispatcher),
            DispatchTicket {
                generation,
                device_id: device_id.clone(),
                command: command.clone(),
            },
            self.dispatch_timeout,
            cancel,
            self.completion_tx.clone(),
        ));

        DispatchTicket {
            generation,
            device_id,
            command,
        }
    }

    /// Apply a finished dispatch to the grid.
    ///
    /// A successful outcome patches the row of the id the backend
    /// returned, and nothing else. A failed one leaves the grid untouched
    /// and is logged and published to observers before being returned.
    pub fn apply(&mut self, outcome: DispatchOutcome) -> Result<Applied, DispatchError> {
        let DispatchOutcome {
            generation,
            device_id,
            command,
            result,
        } = outcome;

        if self.in_flight.remove(&generation).is_none() {
            debug!(%device_id, generation, "discarding outcome of superseded dispatch");
            return Ok(Applied::Discarded);
        }

        let patched = result.and_then(|update| {
            match self.grid.patch_state(update.id.as_str(), &update.state) {
                Some(row) => Ok((row, update)),
                None => Err(DispatchError::UnknownDevice {
                    id: update.id.to_string(),
                }),
            }
        });

        match patched {
            Ok((row, update)) => {
                info!(device_id = %update.id, %command, state = %update.state, "command applied");
                self.emit(
                    update.id.clone(),
                    command,
                    DispatchEventKind::Applied {
                        state: update.state.clone(),
                    },
                );
                Ok(Applied::Patched { row, update })
            }
            Err(error) => {
                warn!(%device_id, %command, error = %error, "command failed");
                self.emit(
                    device_id,
                    command,
                    DispatchEventKind::Failed {
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Wait for the next finished dispatch.
    ///
    /// Returns `None` when nothing is in flight or the completion
    /// receiver has been taken.
    pub async fn next_completion(&mut self) -> Option<DispatchOutcome> {
        if self.in_flight.is_empty() {
            return None;
        }
        self.completion_rx.as_mut()?.recv().await
    }

    /// Wait until `ticket` finishes, applying every outcome that arrives
    /// in the meantime.
    ///
    /// Fails with [`DispatchError::Superseded`] once the ticket is no
    /// longer in flight without having been settled here.
    pub async fn settle(&mut self, ticket: &DispatchTicket) -> Result<Applied, DispatchError> {
        while self.in_flight.contains_key(&ticket.generation) {
            let Some(outcome) = self.next_completion().await else {
                break;
            };
            if outcome.generation == ticket.generation {
                return self.apply(outcome);
            }
            // Failures of other dispatches are already logged and published.
            let _ = self.apply(outcome);
        }

        Err(DispatchError::Superseded {
            id: ticket.device_id.to_string(),
            command: ticket.command.clone(),
        })
    }

    /// Hand the completion receiver to a caller that forwards outcomes
    /// into its own event loop. Only the first call returns `Some`.
    pub fn take_completions(&mut self) -> Option<mpsc::UnboundedReceiver<DispatchOutcome>> {
        self.completion_rx.take()
    }

    // ── In-flight state ──────────────────────────────────────────

    /// `true` while at least one dispatch for `id` is unsettled.
    pub fn is_pending(&self, id: &str) -> bool {
        self.in_flight.values().any(|f| f.device_id.as_str() == id)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancel every in-flight dispatch. Their outcomes are never applied.
    pub fn cancel_all(&mut self) {
        for (_, flight) in self.in_flight.drain() {
            flight.cancel.cancel();
        }
    }

    // ── Observation ──────────────────────────────────────────────

    /// Subscribe to dispatch events.
    pub fn events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn supersede(&mut self, device_id: &DeviceId) {
        let stale: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| &f.device_id == device_id)
            .map(|(generation, _)| *generation)
            .collect();

        for generation in stale {
            if let Some(flight) = self.in_flight.remove(&generation) {
                flight.cancel.cancel();
                debug!(%device_id, command = %flight.command, generation, "dispatch superseded");
                self.emit(flight.device_id, flight.command, DispatchEventKind::Superseded);
            }
        }
    }

    fn emit(&self, device_id: DeviceId, command: String, kind: DispatchEventKind) {
        let _ = self.event_tx.send(DispatchEvent {
            device_id,
            command,
            kind,
            at: Utc::now(),
        });
    }
}

// ── Background task ──────────────────────────────────────────────

/// Run one dispatch to completion, timeout, or cancellation.
async fn run_dispatch<D: CommandDispatcher>(
    dispatcher: Arc<D>,
    ticket: DispatchTicket,
    timeout: Duration,
    cancel: CancellationToken,
    completions: mpsc::UnboundedSender<DispatchOutcome>,
) {
    let DispatchTicket {
        generation,
        device_id,
        command,
    } = ticket;

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(%device_id, generation, "dispatch cancelled");
            return;
        }
        res = tokio::time::timeout(timeout, dispatcher.send_command(&device_id, &command)) => {
            res.unwrap_or_else(|_| {
                Err(DispatchError::Timeout {
                    timeout_ms: Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
                })
            })
        }
    };

    // The controller may already be gone; nobody is left to apply this.
    let _ = completions.send(DispatchOutcome {
        generation,
        device_id,
        command,
        result,
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Test dispatcher ──────────────────────────────────────────

    type Script = dyn Fn(&DeviceId, &str) -> (Duration, Result<StateUpdate, DispatchError>)
        + Send
        + Sync;

    /// Answers each command after a scripted delay (virtual time).
    struct Scripted(Box<Script>);

    impl Scripted {
        fn new(
            f: impl Fn(&DeviceId, &str) -> (Duration, Result<StateUpdate, DispatchError>)
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self(Box::new(f))
        }

        /// Echo the command back as the new state, immediately.
        fn echo() -> Self {
            Self::new(|id, command| (Duration::ZERO, Ok(update(id.as_str(), command))))
        }
    }

    impl CommandDispatcher for Scripted {
        fn send_command(
            &self,
            id: &DeviceId,
            command: &str,
        ) -> impl Future<Output = Result<StateUpdate, DispatchError>> + Send {
            let (delay, result) = (self.0)(id, command);
            async move {
                tokio::time::sleep(delay).await;
                result
            }
        }
    }

    fn update(id: &str, state: &str) -> StateUpdate {
        StateUpdate {
            id: DeviceId::new(id),
            state: state.into(),
        }
    }

    fn device(id: &str, type_name: &str, name: &str, state: &str, commands: &[&str]) -> Device {
        Device {
            id: DeviceId::new(id),
            name: name.into(),
            type_name: type_name.into(),
            state: state.into(),
            commands: commands.iter().map(|c| (*c).to_owned()).collect(),
        }
    }

    /// Already in grid order: Light/Bulb, Light/Lamp, Switch/Fan.
    fn sample() -> Vec<Device> {
        vec![
            device("2", "Light", "Bulb", "on", &["off"]),
            device("1", "Light", "Lamp", "off", &["on", "off"]),
            device("3", "Switch", "Fan", "off", &["toggle"]),
        ]
    }

    fn controller(dispatcher: Scripted) -> GridController<Scripted> {
        let mut ctl = GridController::new(dispatcher);
        ctl.render(&sample());
        ctl
    }

    fn state_of<D: CommandDispatcher>(ctl: &GridController<D>, id: &str) -> String {
        ctl.grid().device_row(id).unwrap().state().to_owned()
    }

    // ── Tests ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn dispatch_on_patches_only_the_lamp() {
        let mut ctl = controller(Scripted::new(|_, _| (Duration::ZERO, Ok(update("1", "on")))));
        let before = ctl.grid().rows().to_vec();
        let lamp_row = ctl.grid().row_index("1").unwrap();

        let ticket = ctl.activate(lamp_row, 0).unwrap();
        assert_eq!(ticket.command, "on");
        assert!(ctl.is_pending("1"));

        let applied = ctl.settle(&ticket).await.unwrap();

        assert_eq!(
            applied,
            Applied::Patched {
                row: lamp_row,
                update: update("1", "on")
            }
        );
        assert_eq!(state_of(&ctl, "1"), "on");
        for (i, (old, new)) in before.iter().zip(ctl.grid().rows()).enumerate() {
            if i != lamp_row {
                assert_eq!(old, new, "row {i} must be untouched");
            }
        }
        assert!(!ctl.is_pending("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_leaves_grid_unchanged_and_is_published() {
        let mut ctl = controller(Scripted::new(|_, _| {
            (
                Duration::from_millis(10),
                Err(DispatchError::Status {
                    status: 500,
                    body: String::new(),
                }),
            )
        }));
        let mut events = ctl.events();
        let before = ctl.grid().rows().to_vec();

        let ticket = ctl.dispatch(DeviceId::new("1"), "on");
        let err = ctl.settle(&ticket).await.unwrap_err();

        assert!(matches!(err, DispatchError::Status { status: 500, .. }));
        assert_eq!(ctl.grid().rows(), before.as_slice());

        let event = events.try_recv().unwrap();
        assert_eq!(event.device_id.as_str(), "1");
        assert!(matches!(event.kind, DispatchEventKind::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn response_id_selects_the_row() {
        // Backends may answer for a different id than requested (e.g. a
        // group member); the returned id is authoritative.
        let mut ctl = controller(Scripted::new(|_, _| (Duration::ZERO, Ok(update("3", "on")))));

        let ticket = ctl.dispatch(DeviceId::new("1"), "on");
        ctl.settle(&ticket).await.unwrap();

        assert_eq!(state_of(&ctl, "3"), "on");
        assert_eq!(state_of(&ctl, "1"), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_response_id_is_an_error() {
        let mut ctl = controller(Scripted::new(|_, _| (Duration::ZERO, Ok(update("99", "on")))));
        let before = ctl.grid().rows().to_vec();

        let ticket = ctl.dispatch(DeviceId::new("1"), "on");
        let err = ctl.settle(&ticket).await.unwrap_err();

        assert_eq!(err, DispatchError::UnknownDevice { id: "99".into() });
        assert_eq!(ctl.grid().rows(), before.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let mut ctl = controller(Scripted::new(|id, _| {
            (Duration::from_secs(60), Ok(update(id.as_str(), "on")))
        }))
        .with_dispatch_timeout(Duration::from_secs(2));

        let ticket = ctl.dispatch(DeviceId::new("1"), "on");
        let err = ctl.settle(&ticket).await.unwrap_err();

        assert_eq!(
            err,
            DispatchError::Timeout {
                timeout_ms: Some(2000)
            }
        );
        assert_eq!(state_of(&ctl, "1"), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn newer_dispatch_supersedes_older() {
        let mut ctl = controller(Scripted::new(|id, command| {
            let delay = if command == "on" { 5 } else { 1 };
            (Duration::from_secs(delay), Ok(update(id.as_str(), command)))
        }));
        let mut events = ctl.events();

        let first = ctl.dispatch(DeviceId::new("1"), "on");
        let second = ctl.dispatch(DeviceId::new("1"), "off");
        assert_eq!(ctl.pending_count(), 1);

        ctl.settle(&second).await.unwrap();
        assert!(ctl.next_completion().await.is_none());
        assert_eq!(state_of(&ctl, "1"), "off");

        let superseded = ctl.settle(&first).await.unwrap_err();
        assert!(matches!(superseded, DispatchError::Superseded { .. }));

        let kinds: Vec<DispatchEventKind> =
            std::iter::from_fn(|| events.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DispatchEventKind::Superseded,
                DispatchEventKind::Applied {
                    state: "off".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn last_response_wins_applies_in_arrival_order() {
        let mut ctl = controller(Scripted::new(|id, command| {
            let delay = if command == "on" { 5 } else { 1 };
            (Duration::from_secs(delay), Ok(update(id.as_str(), command)))
        }))
        .with_policy(DispatchPolicy::LastResponseWins);

        let slow = ctl.dispatch(DeviceId::new("1"), "on");
        let fast = ctl.dispatch(DeviceId::new("1"), "off");
        assert_eq!(ctl.pending_count(), 2);

        ctl.settle(&fast).await.unwrap();
        assert_eq!(state_of(&ctl, "1"), "off");

        ctl.settle(&slow).await.unwrap();
        assert_eq!(state_of(&ctl, "1"), "on");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_dispatches_to_different_devices() {
        let mut ctl = controller(Scripted::echo());

        ctl.dispatch(DeviceId::new("1"), "on");
        ctl.dispatch(DeviceId::new("3"), "toggle");
        assert!(ctl.is_pending("1") && ctl.is_pending("3"));

        while let Some(outcome) = ctl.next_completion().await {
            ctl.apply(outcome).unwrap();
        }

        assert_eq!(state_of(&ctl, "1"), "on");
        assert_eq!(state_of(&ctl, "3"), "toggle");
        assert_eq!(state_of(&ctl, "2"), "on");
    }

    #[tokio::test(start_paused = true)]
    async fn forwarded_completions_apply_the_same_way() {
        let mut ctl = controller(Scripted::echo());
        let mut rx = ctl.take_completions().unwrap();
        assert!(ctl.take_completions().is_none());

        ctl.dispatch(DeviceId::new("3"), "toggle");
        let outcome = rx.recv().await.unwrap();
        let applied = ctl.apply(outcome).unwrap();

        assert!(matches!(applied, Applied::Patched { row: 4, .. }));
        assert_eq!(state_of(&ctl, "3"), "toggle");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending_outcomes() {
        let mut ctl = controller(Scripted::new(|id, _| {
            (Duration::from_secs(1), Ok(update(id.as_str(), "on")))
        }));

        ctl.dispatch(DeviceId::new("1"), "on");
        ctl.cancel_all();

        assert_eq!(ctl.pending_count(), 0);
        assert!(ctl.next_completion().await.is_none());
        assert_eq!(state_of(&ctl, "1"), "off");
    }

    #[test]
    fn activate_rejects_headers_and_missing_affordances() {
        let mut ctl = controller(Scripted::echo());

        assert_eq!(
            ctl.activate(0, 0).unwrap_err(),
            DispatchError::NoSuchAffordance { row: 0, index: 0 }
        );
        let lamp_row = ctl.grid().row_index("1").unwrap();
        assert_eq!(
            ctl.activate(lamp_row, 5).unwrap_err(),
            DispatchError::NoSuchAffordance {
                row: lamp_row,
                index: 5
            }
        );
        assert_eq!(ctl.pending_count(), 0);
    }

    #[tokio::test]
    async fn failed_load_leaves_grid_empty() {
        struct Down;
        impl DeviceSource for Down {
            async fn list_devices(&self) -> Result<Vec<Device>, FetchError> {
                Err(FetchError::Timeout)
            }
        }

        let mut ctl = controller(Scripted::echo());
        assert!(!ctl.grid().is_empty());

        let err = ctl.load(&DeviceListFetcher::new(Down)).await.unwrap_err();

        assert_eq!(err, FetchError::Timeout);
        assert!(ctl.grid().is_empty());
    }

    #[test]
    fn rendering_twice_does_not_duplicate_rows() {
        let mut ctl = controller(Scripted::echo());
        ctl.render(&sample());
        assert_eq!(ctl.grid().len(), 5);
        assert_eq!(ctl.grid().device_count(), 3);
    }
}
