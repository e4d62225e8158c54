//! Application core: event loop, dispatch routing, overlays.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devgrid_core::{
    Applied, DeviceApiClient, DeviceGrid, DeviceListFetcher, DispatchEvent, DispatchEventKind,
    GridController,
};

use crate::action::{Action, GridSnapshot, Notification, NotificationLevel};
use crate::component::Component;
use crate::data_bridge::spawn_data_bridge;
use crate::event::{Event, EventReader};
use crate::screens::GridScreen;
use crate::theme;
use crate::tui::Tui;

const TOAST_TTL: Duration = Duration::from_secs(4);

/// Top-level application state and event loop.
pub struct App {
    /// `Err` carries the reason no backend could be configured.
    controller: Result<GridController<DeviceApiClient>, String>,
    /// Shown in the status bar.
    backend_label: String,
    screen: Box<dyn Component>,
    running: bool,
    help_visible: bool,
    notification: Option<(Notification, Instant)>,
    last_dispatch: Option<DateTime<Utc>>,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
    cancel: CancellationToken,
}

impl App {
    pub fn new(
        controller: Result<GridController<DeviceApiClient>, String>,
        backend_label: String,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        Self {
            controller,
            backend_label,
            screen: Box::new(GridScreen::new()),
            running: true,
            help_visible: false,
            notification: None,
            last_dispatch: None,
            action_tx,
            action_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the main event loop.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;

        self.start_bridge()?;

        let mut events = EventReader::new(
            Duration::from_millis(250), // 4 Hz tick
            Duration::from_millis(33),  // ~30 FPS render
        );

        info!("TUI event loop started");

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };

            match event {
                Event::Key(key) => {
                    if let Some(action) = self.handle_key_event(key)? {
                        self.action_tx.send(action)?;
                    }
                }
                Event::Tick => self.action_tx.send(Action::Tick)?,
                Event::Render | Event::Resize => self.action_tx.send(Action::Render)?,
            }

            while let Ok(action) = self.action_rx.try_recv() {
                self.process_action(&action)?;

                if let Action::Render = action {
                    tui.draw(|frame| self.render(frame))?;
                }
            }
        }

        events.stop();
        self.shutdown();
        info!("TUI event loop ended");
        Ok(())
    }

    /// Start the single fetch and the completion/event forwarding.
    fn start_bridge(&mut self) -> Result<()> {
        match self.controller.as_mut() {
            Ok(controller) => {
                let fetcher = DeviceListFetcher::new(controller.dispatcher().clone());
                let events = controller.events();
                if let Some(completions) = controller.take_completions() {
                    tokio::spawn(spawn_data_bridge(
                        fetcher,
                        completions,
                        events,
                        self.action_tx.clone(),
                        self.cancel.clone(),
                    ));
                }
            }
            Err(reason) => {
                self.action_tx.send(Action::LoadFailed(reason.clone()))?;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Ok(controller) = self.controller.as_mut() {
            controller.cancel_all();
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if self.help_visible {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('?') => Ok(Some(Action::ToggleHelp)),
                KeyCode::Char('q') => Ok(Some(Action::Quit)),
                _ => Ok(None),
            };
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c'))
            | (KeyModifiers::NONE, KeyCode::Char('q')) => return Ok(Some(Action::Quit)),
            (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char('?')) => {
                return Ok(Some(Action::ToggleHelp));
            }
            _ => {}
        }

        self.screen.handle_key_event(key)
    }

    fn process_action(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Quit => {
                self.running = false;
            }

            Action::Render => {}

            Action::Tick => {
                if self
                    .notification
                    .as_ref()
                    .is_some_and(|(_, created)| created.elapsed() > TOAST_TTL)
                {
                    self.notification = None;
                }
            }

            Action::ToggleHelp => {
                self.help_visible = !self.help_visible;
            }

            Action::Notify(n) => {
                self.notification = Some((n.clone(), Instant::now()));
            }

            Action::DevicesLoaded(devices) => {
                if let Ok(controller) = self.controller.as_mut() {
                    controller.render(devices);
                    self.publish_grid()?;
                }
            }

            Action::Activate { row, index } => {
                if let Ok(controller) = self.controller.as_mut() {
                    match controller.activate(*row, *index) {
                        Ok(ticket) => {
                            debug!(
                                device = %ticket.device_id,
                                command = %ticket.command,
                                generation = ticket.generation,
                                "command dispatched"
                            );
                            self.publish_grid()?;
                        }
                        Err(e) => {
                            self.action_tx
                                .send(Action::Notify(Notification::error(e.to_string())))?;
                        }
                    }
                }
            }

            Action::DispatchCompleted(outcome) => {
                if let Ok(controller) = self.controller.as_mut() {
                    match controller.apply(outcome.clone()) {
                        Ok(Applied::Patched { row, update }) => {
                            debug!(row, device = %update.id, state = %update.state, "row patched");
                        }
                        Ok(Applied::Discarded) => {}
                        // Already published as a DispatchEvent
                        Err(e) => debug!(error = %e, "dispatch failed"),
                    }
                    self.publish_grid()?;
                }
            }

            Action::DispatchObserved(event) => {
                self.last_dispatch = Some(event.at);
                if let Ok(controller) = self.controller.as_ref() {
                    let notification = describe_event(controller.grid(), event);
                    if notification.level == NotificationLevel::Error {
                        warn!(message = %notification.message, "dispatch failed");
                    }
                    self.action_tx.send(Action::Notify(notification))?;
                }
            }

            other @ (Action::GridUpdated(_) | Action::LoadFailed(_)) => {
                if let Some(follow_up) = self.screen.update(other)? {
                    self.action_tx.send(follow_up)?;
                }
            }
        }

        Ok(())
    }

    fn publish_grid(&self) -> Result<()> {
        if let Ok(controller) = self.controller.as_ref() {
            self.action_tx
                .send(Action::GridUpdated(GridSnapshot::capture(controller)))?;
        }
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.controller
            .as_ref()
            .map_or(0, GridController::pending_count)
    }

    // ── Rendering ────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let layout = Layout::vertical([
            Constraint::Min(1),    // Grid
            Constraint::Length(1), // Status bar
        ])
        .split(area);

        self.screen.render(frame, layout[0]);
        self.render_status_bar(frame, layout[1]);

        if let Some((ref notification, _)) = self.notification {
            render_notification(frame, area, notification);
        }

        if self.help_visible {
            render_help_overlay(frame, area);
        }
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let pending = self.pending_count();
        let pending_span = if pending > 0 {
            Span::styled(format!("{pending} pending"), theme::state_pending())
        } else {
            Span::styled("idle", Style::default().fg(theme::SUCCESS_GREEN))
        };

        let mut spans = vec![
            Span::styled(" devgrid ", theme::title_style()),
            Span::styled("│ ", theme::key_hint()),
            Span::styled(self.backend_label.clone(), theme::table_row()),
            Span::styled(" │ ", theme::key_hint()),
            pending_span,
        ];
        if let Some(at) = self.last_dispatch {
            spans.push(Span::styled(
                format!(" │ last reply {}", at.with_timezone(&Local).format("%H:%M:%S")),
                theme::key_hint(),
            ));
        }
        spans.push(Span::styled(" │ ? help  q quit", theme::key_hint()));

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}

/// Toast text for a dispatch event, naming the device when the grid knows it.
fn describe_event(grid: &DeviceGrid, event: &DispatchEvent) -> Notification {
    let name = grid
        .device_row(event.device_id.as_str())
        .map_or_else(|| event.device_id.to_string(), |row| row.name.clone());
    let command = &event.command;

    match &event.kind {
        DispatchEventKind::Applied { state } => {
            Notification::success(format!("{name}: {command} → {state}"))
        }
        DispatchEventKind::Failed { error } => {
            Notification::error(format!("{name}: {command} failed: {error}"))
        }
        DispatchEventKind::Superseded => {
            Notification::info(format!("{name}: {command} superseded"))
        }
    }
}

/// Render a notification toast in the bottom-right corner.
fn render_notification(frame: &mut Frame, area: Rect, notif: &Notification) {
    let msg_len = u16::try_from(notif.message.chars().count()).unwrap_or(u16::MAX);
    let width = msg_len
        .saturating_add(6)
        .clamp(20, 60)
        .min(area.width);
    let height = 3u16.min(area.height);

    let x = area.width.saturating_sub(width + 1);
    let y = area.height.saturating_sub(height + 2); // above status bar
    let toast_area = Rect::new(area.x + x, area.y + y, width, height);

    let (border_color, icon) = match notif.level {
        NotificationLevel::Success => (theme::SUCCESS_GREEN, "✓"),
        NotificationLevel::Error => (theme::ERROR_RED, "✗"),
        NotificationLevel::Info => (theme::NEON_CYAN, "·"),
    };

    frame.render_widget(Clear, toast_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(theme::BG_DARK));

    let inner = block.inner(toast_area);
    frame.render_widget(block, toast_area);

    let line = Line::from(vec![
        Span::styled(format!(" {icon} "), Style::default().fg(border_color)),
        Span::styled(notif.message.clone(), Style::default().fg(theme::DIM_WHITE)),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let help_width = 44u16.min(area.width.saturating_sub(4));
    let help_height = 12u16.min(area.height.saturating_sub(4));

    let x = (area.width.saturating_sub(help_width)) / 2;
    let y = (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(area.x + x, area.y + y, help_width, help_height);

    frame.render_widget(Clear, help_area);

    let block = Block::default()
        .title(" Keyboard Shortcuts ")
        .title_style(theme::title_style())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme::border_focused())
        .style(Style::default().bg(theme::BG_DARK));

    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);

    let entry = |key: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {key:<10}"), theme::key_hint_key()),
            Span::styled(what, theme::key_hint()),
        ])
    };

    let help_text = vec![
        Line::from(""),
        entry("j/k ↑/↓", "Previous / next device"),
        entry("h/l ←/→", "Previous / next command"),
        entry("Enter", "Send selected command"),
        entry("?", "Toggle this help"),
        entry("q Ctrl+c", "Quit"),
        Line::from(""),
        Line::from(Span::styled("  Esc or ? to close", theme::key_hint())),
    ];

    frame.render_widget(Paragraph::new(help_text), inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgrid_core::{Device, DeviceId, DispatchError};
    use pretty_assertions::assert_eq;

    fn grid() -> DeviceGrid {
        let mut grid = DeviceGrid::new();
        grid.render(&[Device {
            id: DeviceId::from("1"),
            name: "Lamp".into(),
            type_name: "Light".into(),
            state: "off".into(),
            commands: vec!["on".into()],
        }]);
        grid
    }

    fn event(id: &str, kind: DispatchEventKind) -> DispatchEvent {
        DispatchEvent {
            device_id: DeviceId::from(id),
            command: "on".into(),
            kind,
            at: Utc::now(),
        }
    }

    #[test]
    fn applied_event_names_the_device() {
        let n = describe_event(
            &grid(),
            &event(
                "1",
                DispatchEventKind::Applied {
                    state: "on".into(),
                },
            ),
        );
        assert_eq!(n, Notification::success("Lamp: on → on"));
    }

    #[test]
    fn failed_event_is_an_error_toast() {
        let n = describe_event(
            &grid(),
            &event(
                "1",
                DispatchEventKind::Failed {
                    error: DispatchError::Timeout {
                        timeout_ms: Some(10_000),
                    },
                },
            ),
        );
        assert_eq!(n.level, NotificationLevel::Error);
        assert!(n.message.starts_with("Lamp: on failed"));
    }

    #[test]
    fn unknown_device_falls_back_to_id() {
        let n = describe_event(&grid(), &event("9", DispatchEventKind::Superseded));
        assert_eq!(n, Notification::info("9: on superseded"));
    }
}
