//! CLI error types with miette diagnostics.
//!
//! Maps `FetchError` / `DispatchError` / `ConfigError` into user-facing
//! errors with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use devgrid_config::ConfigError;
use devgrid_core::{DispatchError, FetchError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to device backend at {url}")]
    #[diagnostic(
        code(devgrid::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Backend rejected the request (HTTP {status})")]
    #[diagnostic(
        code(devgrid::unauthorized),
        help(
            "Check the bearer token for this profile.\n\
             Store one with: devgrid config set-token"
        )
    )]
    Unauthorized { status: u16 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(devgrid::not_found),
        help("Run: devgrid {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Device '{device}' has no command '{command}'")]
    #[diagnostic(code(devgrid::unknown_command), help("Available commands: {available}"))]
    UnknownCommand {
        device: String,
        command: String,
        available: String,
    },

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend error (HTTP {status})")]
    #[diagnostic(code(devgrid::backend_status), help("{body}"))]
    BackendStatus { status: u16, body: String },

    #[error("Backend sent a malformed response: {message}")]
    #[diagnostic(
        code(devgrid::malformed),
        help("The backend may not speak the devgrid device protocol, or a proxy altered the reply.")
    )]
    Malformed { message: String },

    #[error("Command '{command}' on device '{device}' was superseded")]
    #[diagnostic(code(devgrid::superseded))]
    Superseded { device: String, command: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("{what} timed out")]
    #[diagnostic(
        code(devgrid::timeout),
        help("Increase --timeout / --dispatch-timeout or check backend responsiveness.")
    )]
    Timeout { what: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devgrid::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(devgrid::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: devgrid config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(devgrid::no_config),
        help(
            "Create a profile with: devgrid config init\n\
             Or pass --server / set DEVGRID_SERVER.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(devgrid::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {0}")]
    #[diagnostic(code(devgrid::keyring))]
    Keyring(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(devgrid::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(devgrid::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(devgrid::config_write))]
    ConfigWrite(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Unauthorized { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::UnknownCommand { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::BackendStatus { status, body },
        }
    }
}

// ── Core → CliError mapping ──────────────────────────────────────────

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            FetchError::Timeout => Self::Timeout {
                what: "Device listing".into(),
            },
            FetchError::Status { status, body } => Self::from_status(status, body),
            FetchError::Malformed { message } => Self::Malformed { message },
            FetchError::DuplicateId { id } => Self::Malformed {
                message: format!("device id '{id}' appears more than once"),
            },
            FetchError::Config { message } => Self::Validation {
                field: "server".into(),
                reason: message,
            },
        }
    }
}

impl From<DispatchError> for CliError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ConnectionFailed { url, reason } => {
                Self::ConnectionFailed { url, reason }
            }
            DispatchError::Timeout { timeout_ms } => Self::Timeout {
                what: timeout_ms.map_or_else(
                    || "Device command".into(),
                    |ms| format!("Device command (after {ms}ms)"),
                ),
            },
            DispatchError::Status { status, body } => Self::from_status(status, body),
            DispatchError::Malformed { message } => Self::Malformed { message },
            DispatchError::UnknownDevice { id } => Self::Malformed {
                message: format!("backend reported state for unknown device '{id}'"),
            },
            DispatchError::NoSuchAffordance { row, index } => Self::Validation {
                field: "command".into(),
                reason: format!("no command at row {row}, position {index}"),
            },
            DispatchError::Superseded { id, command } => Self::Superseded {
                device: id,
                command,
            },
            DispatchError::Config { message } => Self::Validation {
                field: "server".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => Self::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Keyring(message) => Self::Keyring(message),
            ConfigError::Serialization(e) => Self::ConfigWrite(e.to_string()),
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}
