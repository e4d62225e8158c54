//! Device grid screen: grouped table with per-row command affordances.

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Paragraph, Row, Table, TableState, Wrap,
};

use devgrid_core::{DeviceRow, GridRow};

use crate::action::{Action, GridSnapshot};
use crate::component::Component;
use crate::theme;

const PENDING_MARKER: &str = "…";

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadStatus {
    Loading,
    Loaded,
    Failed(String),
}

pub struct GridScreen {
    snapshot: GridSnapshot,
    status: LoadStatus,
    /// Grid row index of the selected device row.
    selected: Option<usize>,
    /// Index into the selected row's affordances.
    command_index: usize,
}

impl Default for GridScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl GridScreen {
    pub fn new() -> Self {
        Self {
            snapshot: GridSnapshot::default(),
            status: LoadStatus::Loading,
            selected: None,
            command_index: 0,
        }
    }

    fn device_rows(&self) -> Vec<usize> {
        self.snapshot.grid.device_row_indices().collect()
    }

    fn selected_device(&self) -> Option<&DeviceRow> {
        self.snapshot
            .grid
            .row(self.selected?)
            .and_then(GridRow::as_device)
    }

    /// Keep the selection on a device row after the grid changes.
    fn reconcile_selection(&mut self) {
        let rows = self.device_rows();
        self.selected = match self.selected {
            Some(current) if rows.contains(&current) => Some(current),
            _ => rows.first().copied(),
        };
        self.clamp_command();
    }

    fn clamp_command(&mut self) {
        let len = self.selected_device().map_or(0, |row| row.commands().len());
        self.command_index = self.command_index.min(len.saturating_sub(1));
    }

    /// Move between device rows, skipping group headers.
    fn move_selection(&mut self, delta: isize) {
        let rows = self.device_rows();
        if rows.is_empty() {
            return;
        }
        let current = self
            .selected
            .and_then(|row| rows.iter().position(|&r| r == row))
            .unwrap_or(0);
        let next = current
            .saturating_add_signed(delta)
            .min(rows.len() - 1);
        if rows.get(next).copied() != self.selected {
            self.selected = rows.get(next).copied();
            self.command_index = 0;
        }
    }

    fn move_command(&mut self, delta: isize) {
        let len = self.selected_device().map_or(0, |row| row.commands().len());
        if len == 0 {
            return;
        }
        self.command_index = self.command_index.saturating_add_signed(delta).min(len - 1);
    }

    fn activate_selected(&self) -> Option<Action> {
        let row = self.selected?;
        let device = self.selected_device()?;
        if device.commands().is_empty() {
            return None;
        }
        Some(Action::Activate {
            row,
            index: self.command_index,
        })
    }

    fn render_status_panel(frame: &mut Frame, area: Rect, title: &str, message: &str, error: bool) {
        let color = if error { theme::ERROR_RED } else { theme::NEON_CYAN };
        let block = Block::default()
            .title(format!(" {title} "))
            .title_style(Style::default().fg(color))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(color));

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(format!("  {message}"), theme::table_row())),
            Line::from(""),
            Line::from(vec![
                Span::styled("  q ", theme::key_hint_key()),
                Span::styled("quit", theme::key_hint()),
            ]),
        ];
        frame.render_widget(
            Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn commands_line(&self, row_index: usize, device: &DeviceRow) -> Line<'static> {
        let selected_row = self.selected == Some(row_index);
        let mut spans = Vec::with_capacity(device.commands().len() * 2);
        for (i, affordance) in device.commands().iter().enumerate() {
            let style = if selected_row && i == self.command_index {
                theme::command_selected()
            } else {
                theme::command()
            };
            spans.push(Span::styled(format!("[{}]", affordance.command), style));
            spans.push(Span::raw(" "));
        }
        Line::from(spans)
    }

    fn table_rows(&self) -> Vec<Row<'static>> {
        self.snapshot
            .grid
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| match row {
                GridRow::Header { type_name } => Row::new(vec![
                    Cell::from(type_name.clone()).style(theme::group_header()),
                ]),
                GridRow::Device(device) => {
                    let is_selected = self.selected == Some(i);
                    let prefix = if is_selected { "▸ " } else { "  " };
                    let pending = self.snapshot.is_pending(device.id());

                    let state = if pending {
                        Cell::from(format!("{} {PENDING_MARKER}", device.state()))
                            .style(theme::state_pending())
                    } else {
                        Cell::from(device.state().to_owned()).style(theme::state_settled())
                    };

                    Row::new(vec![
                        Cell::from(format!("{prefix}{}", device.leading)),
                        Cell::from(device.name.clone()).style(Style::default().fg(theme::NEON_CYAN)),
                        state,
                        Cell::from(self.commands_line(i, device)),
                    ])
                    .style(if is_selected {
                        theme::table_selected()
                    } else {
                        theme::table_row()
                    })
                }
            })
            .collect()
    }
}

impl Component for GridScreen {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('l') | KeyCode::Right => self.move_command(1),
            KeyCode::Char('h') | KeyCode::Left => self.move_command(-1),
            KeyCode::Enter => return Ok(self.activate_selected()),
            _ => {}
        }
        Ok(None)
    }

    fn update(&mut self, action: &Action) -> Result<Option<Action>> {
        match action {
            Action::GridUpdated(snapshot) => {
                self.snapshot = snapshot.clone();
                if self.status == LoadStatus::Loading {
                    self.status = LoadStatus::Loaded;
                }
                self.reconcile_selection();
            }
            Action::LoadFailed(message) => {
                self.status = LoadStatus::Failed(message.clone());
                self.snapshot = GridSnapshot::default();
                self.selected = None;
            }
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        match &self.status {
            LoadStatus::Loading => {
                Self::render_status_panel(frame, area, "Devices", "Loading devices…", false);
                return;
            }
            LoadStatus::Failed(message) => {
                Self::render_status_panel(frame, area, "Could not load devices", message, true);
                return;
            }
            LoadStatus::Loaded => {}
        }

        let device_count = self.snapshot.grid.device_count();
        let block = Block::default()
            .title(format!(" Devices ({device_count}) "))
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_focused());

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let layout = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(inner);

        if device_count == 0 {
            frame.render_widget(
                Paragraph::new(Span::styled("  No devices reported.", theme::key_hint())),
                layout[0],
            );
        } else {
            let header = Row::new(vec![
                Cell::from("Type").style(theme::table_header()),
                Cell::from("Name").style(theme::table_header()),
                Cell::from("State").style(theme::table_header()),
                Cell::from("Commands").style(theme::table_header()),
            ]);
            let widths = [
                Constraint::Length(12),
                Constraint::Min(14),
                Constraint::Length(14),
                Constraint::Min(20),
            ];
            let table = Table::new(self.table_rows(), widths).header(header);

            let mut state = TableState::default().with_selected(self.selected);
            frame.render_stateful_widget(table, layout[0], &mut state);
        }

        let hints = Line::from(vec![
            Span::styled("  j/k ", theme::key_hint_key()),
            Span::styled("device  ", theme::key_hint()),
            Span::styled("h/l ", theme::key_hint_key()),
            Span::styled("command  ", theme::key_hint()),
            Span::styled("Enter ", theme::key_hint_key()),
            Span::styled("send", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(hints), layout[1]);
    }
}
