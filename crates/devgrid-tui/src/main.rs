//! `devgrid-tui`: terminal dashboard for a home-automation device registry.
//!
//! Fetches the device collection once, shows it grouped by device type,
//! and sends commands from the grid, patching state cells as the backend
//! answers.
//!
//! Logs go to a file (default `$TMPDIR/devgrid-tui.log`) so they never
//! touch the terminal UI.

mod action;
mod app;
mod component;
mod data_bridge;
mod event;
mod screens;
mod theme;
mod tui;

use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::Result;
use secrecy::SecretString;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use devgrid_core::{ControllerConfig, DeviceApiClient, GridController, TlsVerification};

use crate::app::App;

/// Terminal dashboard for home-automation devices.
#[derive(Parser, Debug)]
#[command(name = "devgrid-tui", version, about)]
struct Cli {
    /// Profile from the devgrid config file
    #[arg(short = 'p', long, env = "DEVGRID_PROFILE")]
    profile: Option<String>,

    /// Backend URL (e.g., http://hub.local:8080); overrides the profile
    #[arg(short = 's', long, env = "DEVGRID_SERVER")]
    server: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "DEVGRID_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(short = 'k', long, env = "DEVGRID_INSECURE")]
    insecure: bool,

    /// Log file path
    #[arg(long, default_value_os_t = std::env::temp_dir().join("devgrid-tui.log"))]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// File-based tracing; stdout and stderr belong to the terminal UI.
/// The returned guard flushes the log on drop.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("devgrid_tui={log_level},devgrid_core={log_level}"))
    });

    let temp_dir = std::env::temp_dir();
    let log_dir = cli.log_file.parent().unwrap_or(temp_dir.as_path());
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("devgrid-tui.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, Path::new(log_filename));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

/// Resolve the backend config: `--server` wins, then the chosen (or
/// default) profile. Flag overrides apply on top of either.
fn resolve_config(cli: &Cli) -> Result<ControllerConfig, String> {
    let mut config = match cli.server.as_deref() {
        Some(raw) => {
            let url = devgrid_config::parse_server_url(raw).map_err(|e| e.to_string())?;
            ControllerConfig::new(url)
        }
        None => config_from_profile(cli.profile.as_deref())?,
    };

    if let Some(ref token) = cli.token {
        config.token = Some(SecretString::from(token.clone()));
    }
    if cli.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    Ok(config)
}

fn config_from_profile(requested: Option<&str>) -> Result<ControllerConfig, String> {
    let cfg = devgrid_config::load_config().map_err(|e| e.to_string())?;
    let name = requested.unwrap_or_else(|| cfg.default_profile_name());

    let profile = match cfg.profile(name) {
        Ok(profile) => profile,
        Err(_) if requested.is_none() => {
            return Err(
                "No backend configured; run `devgrid config init` or pass --server".into(),
            );
        }
        Err(e) => return Err(e.to_string()),
    };

    devgrid_config::profile_to_controller_config(profile, name, &cfg.defaults)
        .map_err(|e| e.to_string())
}

fn build_controller(cli: &Cli) -> Result<(GridController<DeviceApiClient>, String), String> {
    let config = resolve_config(cli)?;
    let label = config.url.to_string();
    let controller = GridController::from_config(&config).map_err(|e| e.to_string())?;
    Ok((controller, label))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Hooks go in before the terminal switches to raw mode
    tui::install_hooks()?;

    let _log_guard = setup_tracing(&cli);

    info!(
        server = cli.server.as_deref().unwrap_or("(profile)"),
        profile = cli.profile.as_deref().unwrap_or("(default)"),
        "starting devgrid-tui"
    );

    let mut app = match build_controller(&cli) {
        Ok((controller, label)) => App::new(Ok(controller), label),
        Err(reason) => {
            warn!(%reason, "no usable backend");
            App::new(Err(reason), "not connected".into())
        }
    };
    app.run().await?;

    Ok(())
}
