// ── Core error types ──
//
// Front ends never see reqwest errors or raw JSON failures. The
// `From<devgrid_api::Error>` impls translate transport-layer errors into
// the two operation-level failures: listing and dispatch.

use thiserror::Error;

/// The device listing could not be obtained. The grid stays empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Cannot reach device backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device listing timed out")]
    Timeout,

    #[error("Backend rejected the device listing with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Malformed device listing: {message}")]
    Malformed { message: String },

    #[error("Device listing contains id {id} more than once")]
    DuplicateId { id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// A command dispatch failed. The affected row keeps its last-known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Cannot reach device backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// `timeout_ms` is the dispatch budget, or `None` when the HTTP
    /// transport gave up first.
    #[error("Command timed out")]
    Timeout { timeout_ms: Option<u64> },

    #[error("Backend rejected the command with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Malformed command response: {message}")]
    Malformed { message: String },

    /// The backend acknowledged a device that is not in the grid.
    #[error("Backend reported state for unknown device {id}")]
    UnknownDevice { id: String },

    /// `activate` was given a row or affordance index with nothing behind it.
    #[error("No command at row {row}, position {index}")]
    NoSuchAffordance { row: usize, index: usize },

    /// The dispatch left flight without a result: a newer one for the same
    /// device replaced it, or it was cancelled.
    #[error("Command {command} on device {id} was superseded")]
    Superseded { id: String, command: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DispatchError {
    /// `true` when the backend was never reached or never answered.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

/// Intermediate classification shared by both conversions.
enum Cause {
    Connection { url: String, reason: String },
    Timeout,
    Status { status: u16, body: String },
    Malformed(String),
    Config(String),
}

fn classify(err: devgrid_api::Error) -> Cause {
    match err {
        devgrid_api::Error::Transport(ref e) => {
            if e.is_timeout() {
                Cause::Timeout
            } else if let Some(status) = e.status() {
                Cause::Status {
                    status: status.as_u16(),
                    body: String::new(),
                }
            } else if e.is_decode() {
                Cause::Malformed(e.to_string())
            } else {
                Cause::Connection {
                    url: e
                        .url()
                        .map_or_else(|| "<unknown>".into(), ToString::to_string),
                    reason: e.to_string(),
                }
            }
        }
        devgrid_api::Error::Status { status, body } => Cause::Status { status, body },
        devgrid_api::Error::Deserialization { message, body: _ } => Cause::Malformed(message),
        devgrid_api::Error::MalformedResponse { reason } => Cause::Malformed(reason),
        devgrid_api::Error::InvalidUrl(e) => Cause::Config(format!("Invalid URL: {e}")),
        devgrid_api::Error::InvalidBaseUrl(url) => {
            Cause::Config(format!("Base URL cannot be used for API requests: {url}"))
        }
        devgrid_api::Error::Tls(msg) => Cause::Config(format!("TLS error: {msg}")),
        devgrid_api::Error::InvalidHeader(msg) => Cause::Config(msg),
    }
}

impl From<devgrid_api::Error> for FetchError {
    fn from(err: devgrid_api::Error) -> Self {
        match classify(err) {
            Cause::Connection { url, reason } => Self::ConnectionFailed { url, reason },
            Cause::Timeout => Self::Timeout,
            Cause::Status { status, body } => Self::Status { status, body },
            Cause::Malformed(message) => Self::Malformed { message },
            Cause::Config(message) => Self::Config { message },
        }
    }
}

impl From<devgrid_api::Error> for DispatchError {
    fn from(err: devgrid_api::Error) -> Self {
        match classify(err) {
            Cause::Connection { url, reason } => Self::ConnectionFailed { url, reason },
            Cause::Timeout => Self::Timeout { timeout_ms: None },
            Cause::Status { status, body } => Self::Status { status, body },
            Cause::Malformed(message) => Self::Malformed { message },
            Cause::Config(message) => Self::Config { message },
        }
    }
}
