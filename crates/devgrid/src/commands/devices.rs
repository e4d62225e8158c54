//! Device command handlers.

use tabled::Tabled;

use devgrid_core::{
    Applied, ControllerConfig, Device, DeviceGrid, DeviceListFetcher, DeviceRow, GridController,
    GridRow, StateUpdate,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceTableRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Commands")]
    commands: String,
}

impl From<&DeviceRow> for DeviceTableRow {
    fn from(row: &DeviceRow) -> Self {
        Self {
            id: row.id().to_string(),
            name: row.name.clone(),
            state: row.state().to_owned(),
            commands: row
                .commands()
                .iter()
                .map(|a| a.command.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&Device> for DeviceTableRow {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            state: d.state.clone(),
            commands: d.commands.join(", "),
        }
    }
}

/// One table per type group, each under its type heading.
fn render_grouped(devices: &[Device], color: bool) -> String {
    let mut grid = DeviceGrid::new();
    grid.render(devices);

    let mut sections: Vec<String> = Vec::new();
    let mut pending: Vec<DeviceTableRow> = Vec::new();

    for row in grid.rows() {
        match row {
            GridRow::Header { type_name } => {
                if !pending.is_empty() {
                    sections.push(output::render_table(&pending));
                    pending.clear();
                }
                sections.push(output::heading(type_name, color));
            }
            GridRow::Device(device) => pending.push(DeviceTableRow::from(device)),
        }
    }
    if !pending.is_empty() {
        sections.push(output::render_table(&pending));
    }

    sections.join("\n")
}

fn state_detail(row: &DeviceRow, update: &StateUpdate) -> String {
    [
        format!("ID:       {}", update.id),
        format!("Name:     {}", row.name),
        format!("State:    {}", update.state),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: DevicesArgs,
    config: &ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let fetcher = DeviceListFetcher::new(config.api_client()?);
            let devices = fetcher.fetch_devices().await?;

            if devices.is_empty() && matches!(global.output, OutputFormat::Table) {
                if !global.quiet {
                    eprintln!("No devices reported by the backend.");
                }
                return Ok(());
            }

            let out = match global.output {
                OutputFormat::Table => {
                    render_grouped(&devices, output::should_color(&global.color))
                }
                ref format => output::render_list(
                    format,
                    &devices,
                    |d| DeviceTableRow::from(d),
                    |d| d.id.to_string(),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Command { id, command } => {
            let mut controller = GridController::from_config(config)?;
            let fetcher = DeviceListFetcher::new(controller.dispatcher().clone());
            controller.load(&fetcher).await?;

            let row = controller
                .grid()
                .row_index(&id)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "Device".into(),
                    identifier: id.clone(),
                    list_command: "devices list".into(),
                })?;
            let offered = controller
                .grid()
                .device_row(&id)
                .map(|r| r.commands().to_vec())
                .unwrap_or_default();
            let index = offered
                .iter()
                .position(|a| a.command == command)
                .ok_or_else(|| CliError::UnknownCommand {
                    device: id.clone(),
                    command: command.clone(),
                    available: if offered.is_empty() {
                        "(none)".into()
                    } else {
                        offered
                            .iter()
                            .map(|a| a.command.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    },
                })?;

            let ticket = controller.activate(row, index)?;
            let (patched_row, update) = match controller.settle(&ticket).await? {
                Applied::Patched { row, update } => (row, update),
                Applied::Discarded => {
                    return Err(CliError::Superseded {
                        device: id,
                        command,
                    });
                }
            };

            let device_row = controller
                .grid()
                .row(patched_row)
                .and_then(GridRow::as_device)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "Device".into(),
                    identifier: update.id.to_string(),
                    list_command: "devices list".into(),
                })?;

            let out = output::render_single(
                &global.output,
                &update,
                |u| state_detail(device_row, u),
                |u| u.state.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
